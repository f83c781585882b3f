//! Simulated arm for bench runs and tests.
//!
//! Every driver call is recorded. Faults can be injected for the next call,
//! and arbitrary driver events can be emitted through the handle.

use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::actuator::{
    ActuatorDriver, ArmEvent, EventBus, GripperAction, JointAngles, JointTelemetry, MotionParams,
    Pose, TelemetrySource, JOINT_COUNT, STATE_STOPPED,
};

/// One recorded driver call.
#[derive(Clone, Debug, PartialEq)]
pub enum ArmCall {
    MoveJoints { angles: JointAngles, wait: bool },
    MoveLinear { pose: Pose, wait: bool },
    MoveRelative { offset: Pose, wait: bool },
    MoveTool { pose: Pose, wait: bool },
    Gripper(GripperAction),
    DigitalOutput { io: u8, value: bool },
    AnalogOutput { io: u8, value: f64 },
    SetState(i32),
    Pause(Duration),
    WaitIdle,
}

struct SimInner {
    calls: Vec<ArmCall>,
    fail_next: Option<i32>,
    error_code: i32,
    state: i32,
    telemetry: JointTelemetry,
    motion_delay: Duration,
}

fn lock(inner: &Mutex<SimInner>) -> MutexGuard<'_, SimInner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct SimulatedArm {
    inner: Arc<Mutex<SimInner>>,
    events: EventBus,
}

/// Test / operator handle onto a `SimulatedArm` that has been moved into an `Arm`.
#[derive(Clone)]
pub struct SimHandle {
    inner: Arc<Mutex<SimInner>>,
    events: EventBus,
}

impl SimulatedArm {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                calls: Vec::new(),
                fail_next: None,
                error_code: 0,
                state: 0,
                telemetry: JointTelemetry {
                    temperatures: [36.0, 38.0, 37.0, 35.0, 34.0, 33.0],
                    currents: [0.512, 1.2345, 0.9871, 0.3, 0.25, 0.1],
                },
                motion_delay: Duration::ZERO,
            })),
            events: EventBus::new(),
        }
    }

    /// Sleep this long on every blocking motion, to make sequences observable.
    pub fn with_motion_delay(self, delay: Duration) -> Self {
        lock(&self.inner).motion_delay = delay;
        self
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            inner: self.inner.clone(),
            events: self.events.clone(),
        }
    }

    fn record(&self, call: ArmCall, blocking_motion: bool) -> i32 {
        let (code, delay) = {
            let mut inner = lock(&self.inner);
            inner.calls.push(call);
            let delay = if blocking_motion {
                inner.motion_delay
            } else {
                Duration::ZERO
            };
            match inner.fail_next.take() {
                Some(code) => {
                    inner.error_code = code;
                    (code, Duration::ZERO)
                }
                None => (0, delay),
            }
        };
        if code != 0 {
            self.events.publish(ArmEvent::ErrorChanged {
                error_code: code,
                warn_code: 0,
            });
        } else if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        code
    }
}

impl Default for SimulatedArm {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHandle {
    pub fn calls(&self) -> Vec<ArmCall> {
        lock(&self.inner).calls.clone()
    }

    /// Make the next driver call return `code`.
    pub fn fail_next(&self, code: i32) {
        lock(&self.inner).fail_next = Some(code);
    }

    pub fn emit(&self, event: ArmEvent) {
        if let ArmEvent::StateChanged { state } = event {
            lock(&self.inner).state = state;
        }
        self.events.publish(event);
    }

    pub fn set_telemetry(&self, telemetry: JointTelemetry) {
        lock(&self.inner).telemetry = telemetry;
    }
}

impl TelemetrySource for SimHandle {
    fn joint_telemetry(&self) -> Result<JointTelemetry> {
        Ok(lock(&self.inner).telemetry)
    }
}

impl ActuatorDriver for SimulatedArm {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn move_joints(&mut self, angles: JointAngles, params: MotionParams) -> i32 {
        self.record(
            ArmCall::MoveJoints {
                angles,
                wait: params.wait,
            },
            params.wait,
        )
    }

    fn move_linear(&mut self, pose: Pose, params: MotionParams) -> i32 {
        self.record(
            ArmCall::MoveLinear {
                pose,
                wait: params.wait,
            },
            params.wait,
        )
    }

    fn move_relative(&mut self, offset: Pose, params: MotionParams) -> i32 {
        self.record(
            ArmCall::MoveRelative {
                offset,
                wait: params.wait,
            },
            params.wait,
        )
    }

    fn move_tool(&mut self, pose: Pose, params: MotionParams) -> i32 {
        self.record(
            ArmCall::MoveTool {
                pose,
                wait: params.wait,
            },
            params.wait,
        )
    }

    fn gripper(&mut self, action: GripperAction) -> i32 {
        self.record(ArmCall::Gripper(action), false)
    }

    fn set_digital_output(&mut self, io: u8, value: bool) -> i32 {
        self.record(ArmCall::DigitalOutput { io, value }, false)
    }

    fn set_analog_output(&mut self, io: u8, value: f64) -> i32 {
        self.record(ArmCall::AnalogOutput { io, value }, false)
    }

    fn set_state(&mut self, state: i32) -> i32 {
        let code = self.record(ArmCall::SetState(state), false);
        if code == 0 {
            lock(&self.inner).state = state;
            self.events.publish(ArmEvent::StateChanged { state });
        }
        code
    }

    fn set_pause_time(&mut self, duration: Duration) -> i32 {
        self.record(ArmCall::Pause(duration), false)
    }

    fn wait_idle(&mut self, _timeout: Duration) -> i32 {
        self.record(ArmCall::WaitIdle, true)
    }

    fn error_code(&self) -> i32 {
        lock(&self.inner).error_code
    }

    fn state(&self) -> i32 {
        lock(&self.inner).state
    }

    fn events(&self) -> EventBus {
        self.events.clone()
    }

    fn telemetry(&self) -> Arc<dyn TelemetrySource> {
        Arc::new(self.handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_and_injects_faults() {
        let mut sim = SimulatedArm::new();
        let handle = sim.handle();
        assert_eq!(sim.gripper(GripperAction::Open), 0);
        handle.fail_next(31);
        assert_eq!(sim.set_digital_output(1, true), 31);
        assert_eq!(sim.error_code(), 31);
        assert_eq!(sim.gripper(GripperAction::Stop), 0);
        assert_eq!(handle.calls().len(), 3);
    }

    #[test]
    fn set_state_updates_state() {
        let mut sim = SimulatedArm::new();
        assert_eq!(sim.set_state(STATE_STOPPED), 0);
        assert_eq!(sim.state(), STATE_STOPPED);
    }

    #[test]
    fn telemetry_covers_every_joint() -> Result<()> {
        let sim = SimulatedArm::new();
        let telemetry = sim.telemetry().joint_telemetry()?;
        assert_eq!(telemetry.temperatures.len(), JOINT_COUNT);
        assert_eq!(telemetry.currents.len(), JOINT_COUNT);
        Ok(())
    }
}
