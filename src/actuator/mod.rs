//! Arm collaborator interface and the guarded `Arm` wrapper.
//!
//! Drivers speak in integer result codes (0 = ok), like the vendor SDKs they
//! wrap. `Arm` turns that into `Result`s and enforces the controller's rules:
//!
//! - a non-zero code is fatal: `alive` goes false and the call fails with `ActuatorFault`
//! - no motion is issued while the proximity guard says `Hold` (unless manual override)
//! - fire-and-forget motions are settled before gripper or I/O calls that depend on them
//! - fault events from the driver (error code, state 4) mark the arm dead

pub mod events;
pub mod sim;

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::perception::MotionPermission;
use crate::state::SharedState;

pub use events::{ArmEvent, EventBus, Subscription};
pub use sim::{ArmCall, SimHandle, SimulatedArm};

/// Driver state reported when the arm has been stopped.
pub const STATE_STOPPED: i32 = 4;

pub const JOINT_COUNT: usize = 6;

/// Cartesian pose: mm and degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Pose {
    pub const fn new(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            z,
            roll,
            pitch,
            yaw,
        }
    }
}

pub type JointAngles = [f64; JOINT_COUNT];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum GripperAction {
    Open,
    Close,
    Stop,
}

/// Speed / acceleration / blending for one motion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionParams {
    pub speed: f64,
    pub acceleration: f64,
    pub wait: bool,
    pub radius: Option<f64>,
}

impl MotionParams {
    /// Joint-space defaults (deg/s, deg/s²).
    pub const fn joint() -> Self {
        Self {
            speed: 20.0,
            acceleration: 500.0,
            wait: true,
            radius: Some(0.0),
        }
    }

    /// Cartesian defaults (mm/s, mm/s²).
    pub const fn linear() -> Self {
        Self {
            speed: 100.0,
            acceleration: 2000.0,
            wait: true,
            radius: Some(0.0),
        }
    }

    pub const fn no_wait(mut self) -> Self {
        self.wait = false;
        self
    }

    pub const fn speed(mut self, speed: f64, acceleration: f64) -> Self {
        self.speed = speed;
        self.acceleration = acceleration;
        self
    }

    /// Blend radius; negative means "no blending" to the driver.
    pub const fn radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }
}

/// Per-joint temperature (°C) and current (A), base to wrist.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointTelemetry {
    pub temperatures: [f64; JOINT_COUNT],
    pub currents: [f64; JOINT_COUNT],
}

/// Read-only telemetry access that can be shared with the command channel thread.
pub trait TelemetrySource: Send + Sync {
    fn joint_telemetry(&self) -> Result<JointTelemetry>;
}

/// Low-level arm driver. Every command returns a result code; 0 means success.
pub trait ActuatorDriver: Send {
    fn name(&self) -> &'static str;

    fn move_joints(&mut self, angles: JointAngles, params: MotionParams) -> i32;

    fn move_linear(&mut self, pose: Pose, params: MotionParams) -> i32;

    /// Cartesian offset from the current pose.
    fn move_relative(&mut self, offset: Pose, params: MotionParams) -> i32;

    /// Motion expressed in the tool frame.
    fn move_tool(&mut self, pose: Pose, params: MotionParams) -> i32;

    fn gripper(&mut self, action: GripperAction) -> i32;

    fn set_digital_output(&mut self, io: u8, value: bool) -> i32;

    fn set_analog_output(&mut self, io: u8, value: f64) -> i32;

    fn set_state(&mut self, state: i32) -> i32;

    /// Queue a pause on the controller, behind any motion already queued.
    fn set_pause_time(&mut self, duration: Duration) -> i32;

    /// Block until queued motions have completed.
    fn wait_idle(&mut self, timeout: Duration) -> i32;

    fn error_code(&self) -> i32;

    fn state(&self) -> i32;

    fn events(&self) -> EventBus;

    fn telemetry(&self) -> Arc<dyn TelemetrySource>;
}

// ----------------------------------------------------------------------------
// ActuatorFault
// ----------------------------------------------------------------------------

/// A driver call returned a non-zero code, or the arm was already dead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorFault {
    pub operation: &'static str,
    pub code: i32,
}

impl fmt::Display for ActuatorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actuator {} failed with code {}", self.operation, self.code)
    }
}

impl std::error::Error for ActuatorFault {}

// ----------------------------------------------------------------------------
// Arm
// ----------------------------------------------------------------------------

const HOLD_POLL: Duration = Duration::from_millis(100);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Arm {
    driver: Box<dyn ActuatorDriver>,
    state: SharedState,
    motion_pending: bool,
    _faults: Subscription,
    _counter: Subscription,
}

impl Arm {
    pub fn new(driver: Box<dyn ActuatorDriver>, state: SharedState) -> Self {
        let events = driver.events();
        let fault_state = state.clone();
        let faults = events.subscribe(move |event| match event {
            ArmEvent::ErrorChanged { error_code, .. } if *error_code != 0 => {
                fault_state.mark_dead(&format!("driver error {}", error_code));
            }
            ArmEvent::StateChanged { state } if *state == STATE_STOPPED => {
                fault_state.mark_dead("driver reported stopped state");
            }
            _ => {}
        });
        let counter_state = state.clone();
        let counter = events.subscribe(move |event| {
            if let ArmEvent::CountChanged { count } = event {
                if counter_state.is_alive() {
                    log::info!("arm counter: {}", count);
                }
            }
        });
        log::info!("arm driver {} attached", driver.name());
        Self {
            driver,
            state,
            motion_pending: false,
            _faults: faults,
            _counter: counter,
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn telemetry(&self) -> Arc<dyn TelemetrySource> {
        self.driver.telemetry()
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_alive() && self.driver.error_code() == 0 && self.driver.state() < STATE_STOPPED
    }

    pub fn move_joints(&mut self, angles: JointAngles, params: MotionParams) -> Result<()> {
        self.before_motion("move_joints")?;
        let code = self.driver.move_joints(angles, params);
        self.after_motion("move_joints", code, params.wait)
    }

    pub fn move_linear(&mut self, pose: Pose, params: MotionParams) -> Result<()> {
        self.before_motion("move_linear")?;
        let code = self.driver.move_linear(pose, params);
        self.after_motion("move_linear", code, params.wait)
    }

    pub fn move_relative(&mut self, offset: Pose, params: MotionParams) -> Result<()> {
        self.before_motion("move_relative")?;
        let code = self.driver.move_relative(offset, params);
        self.after_motion("move_relative", code, params.wait)
    }

    pub fn move_tool(&mut self, pose: Pose, params: MotionParams) -> Result<()> {
        self.before_motion("move_tool")?;
        let code = self.driver.move_tool(pose, params);
        self.after_motion("move_tool", code, params.wait)
    }

    pub fn gripper(&mut self, action: GripperAction) -> Result<()> {
        self.ensure_alive("gripper")?;
        self.settle()?;
        let code = self.driver.gripper(action);
        self.check("gripper", code)
    }

    pub fn set_digital_output(&mut self, io: u8, value: bool) -> Result<()> {
        self.ensure_alive("set_digital_output")?;
        self.settle()?;
        let code = self.driver.set_digital_output(io, value);
        self.check("set_digital_output", code)
    }

    pub fn set_analog_output(&mut self, io: u8, value: f64) -> Result<()> {
        self.ensure_alive("set_analog_output")?;
        self.settle()?;
        let code = self.driver.set_analog_output(io, value);
        self.check("set_analog_output", code)
    }

    /// Hold position for `duration` once queued motion has finished.
    pub fn pause(&mut self, duration: Duration) -> Result<()> {
        self.ensure_alive("pause")?;
        self.settle()?;
        let code = self.driver.set_pause_time(duration);
        self.check("set_pause_time", code)
    }

    /// Request a driver state change. Allowed on a dead arm so it can still be stopped.
    pub fn set_state(&mut self, state: i32) -> Result<()> {
        let code = self.driver.set_state(state);
        self.check("set_state", code)
    }

    /// Wait for any fire-and-forget motion to finish.
    pub fn settle(&mut self) -> Result<()> {
        if !self.motion_pending {
            return Ok(());
        }
        let code = self.driver.wait_idle(IDLE_TIMEOUT);
        self.motion_pending = false;
        self.check("wait_idle", code)
    }

    pub fn error_code(&self) -> i32 {
        self.driver.error_code()
    }

    fn ensure_alive(&self, operation: &'static str) -> Result<()> {
        if self.is_alive() {
            return Ok(());
        }
        let code = match self.driver.error_code() {
            0 => self.driver.state(),
            code => code,
        };
        self.state.mark_dead(&format!("{} refused, arm not alive", operation));
        Err(ActuatorFault { operation, code }.into())
    }

    fn before_motion(&self, operation: &'static str) -> Result<()> {
        self.ensure_alive(operation)?;
        let mut announced = false;
        while self.state.motion_permission() == MotionPermission::Hold && !self.state.manual_override() {
            if !announced {
                log::warn!(
                    "{} held: person within {:.1} px of the arm",
                    operation,
                    self.state.last_distance()
                );
                announced = true;
            }
            std::thread::sleep(HOLD_POLL);
            self.ensure_alive(operation)?;
        }
        if announced {
            log::info!("{} released", operation);
        }
        Ok(())
    }

    fn after_motion(&mut self, operation: &'static str, code: i32, wait: bool) -> Result<()> {
        self.check(operation, code)?;
        self.motion_pending = !wait;
        Ok(())
    }

    fn check(&self, operation: &'static str, code: i32) -> Result<()> {
        if code == 0 {
            return Ok(());
        }
        self.state
            .mark_dead(&format!("{} returned code {}", operation, code));
        Err(ActuatorFault { operation, code }.into())
    }
}
