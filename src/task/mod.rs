//! Actuation loop: commands + shared perception state → arm motion.
//!
//! The machine is `Ready` between phases. A phase runs to completion on the
//! calling thread; while it runs, decision tokens (`icecream_go`,
//! `sealing_pass`, ...) are folded into the current order and every other
//! command is dropped. `robot_script_stop` is honoured at the next step
//! boundary. An actuator fault ends the loop for good.

pub mod motions;

use anyhow::{anyhow, Result};
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::actuator::{ActuatorFault, Arm, STATE_STOPPED};
use crate::channel::{
    Command, Decision, Envelope, ExpressiveMotion, Inbound, Notification, NotificationSink,
    OrderRequest,
};
use crate::state::SharedState;

pub use motions::{Slot, Step};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuationPhase {
    Ready,
    RunningOrder,
    Expressive(ExpressiveMotion),
    CleanMode,
    TrashPickup,
    Faulted,
    Stopped,
}

impl fmt::Display for ActuationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("ready"),
            Self::RunningOrder => f.write_str("icecream"),
            Self::Expressive(motion) => write!(f, "{}", motion),
            Self::CleanMode => f.write_str("clean_mode"),
            Self::TrashPickup => f.write_str("trash_mode"),
            Self::Faulted => f.write_str("faulted"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Why the loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskExit {
    /// `robot_script_stop` was received.
    Stopped,
    /// A driver call failed with this code.
    Faulted(i32),
    /// `alive` went false outside of a driver call (fault event or shutdown).
    Halted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TaskConfig {
    pub proceed_timeout: Duration,
    pub sealing_timeout: Duration,
    pub capsule_timeout: Duration,
    pub trash_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            proceed_timeout: Duration::from_secs(60),
            sealing_timeout: Duration::from_secs(5),
            capsule_timeout: Duration::from_secs(10),
            trash_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(200),
        }
    }
}

#[derive(Debug)]
struct StopRequested;

impl fmt::Display for StopRequested {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("robot_script_stop received")
    }
}

impl std::error::Error for StopRequested {}

pub struct TaskStateMachine {
    arm: Arm,
    state: SharedState,
    inbound: Inbound,
    sink: Arc<dyn NotificationSink>,
    cfg: TaskConfig,
    phase: ActuationPhase,
    order: Option<OrderRequest>,
    ready_since: Instant,
}

impl TaskStateMachine {
    pub fn new(arm: Arm, inbound: Inbound, sink: Arc<dyn NotificationSink>, cfg: TaskConfig) -> Self {
        let state = arm.state().clone();
        Self {
            arm,
            state,
            inbound,
            sink,
            cfg,
            phase: ActuationPhase::Ready,
            order: None,
            ready_since: Instant::now(),
        }
    }

    pub fn phase(&self) -> ActuationPhase {
        self.phase
    }

    /// Serve commands until stopped, faulted or `alive` goes false.
    pub fn run(&mut self) -> TaskExit {
        log::info!("task loop ready");
        loop {
            if !self.state.is_alive() {
                return self.halt();
            }
            let Some(envelope) = self.inbound.recv_timeout(self.cfg.poll_interval) else {
                continue;
            };
            if envelope.received_at < self.ready_since {
                log::info!("dropping {:?}: arrived while busy", envelope.command);
                continue;
            }
            if let Some(exit) = self.handle(envelope) {
                return exit;
            }
            self.phase = ActuationPhase::Ready;
            self.ready_since = Instant::now();
        }
    }

    /// Run one command from `Ready`. `Some` means the loop must end.
    fn handle(&mut self, envelope: Envelope) -> Option<TaskExit> {
        let result = match envelope.command {
            Command::Order(order) => self.run_order(order),
            Command::Expressive(motion) => self.run_expressive(motion),
            Command::CleanMode => self.clean_mode(true),
            Command::CleanModeEnd => self.clean_mode(false),
            Command::TrashMode => self.run_trash_mode(),
            Command::ScriptStop => Err(StopRequested.into()),
            Command::Proceed(_) | Command::Sealing(_) => {
                log::debug!("decision token with no order running");
                Ok(())
            }
            Command::Ping | Command::Unsupported(_) => Ok(()),
        };
        match result {
            Ok(()) => None,
            Err(err) if err.is::<StopRequested>() => Some(self.stop()),
            Err(err) => Some(self.fault(err)),
        }
    }

    fn stop(&mut self) -> TaskExit {
        log::warn!("robot_script_stop: stopping arm");
        if let Err(err) = self.arm.set_state(STATE_STOPPED) {
            log::error!("stop request failed: {}", err);
        }
        self.state.mark_dead("robot_script_stop");
        self.phase = ActuationPhase::Stopped;
        TaskExit::Stopped
    }

    fn fault(&mut self, err: anyhow::Error) -> TaskExit {
        let code = match err.downcast_ref::<ActuatorFault>() {
            Some(fault) => fault.code,
            None => self.arm.error_code(),
        };
        log::error!("{} phase failed: {:#}", self.phase, err);
        self.state.mark_dead(&format!("fault during {}", self.phase));
        if code == 0 {
            return self.halt();
        }
        self.notify(Notification::Fault(code));
        self.phase = ActuationPhase::Faulted;
        TaskExit::Faulted(code)
    }

    fn halt(&mut self) -> TaskExit {
        let code = self.arm.error_code();
        if code != 0 {
            self.notify(Notification::Fault(code));
            self.phase = ActuationPhase::Faulted;
            return TaskExit::Faulted(code);
        }
        log::info!("task loop halted: arm no longer alive");
        self.phase = ActuationPhase::Stopped;
        TaskExit::Halted
    }

    fn notify(&self, notification: Notification) {
        if let Err(err) = self.sink.notify(&notification) {
            log::warn!("{:#}", err);
        }
    }

    // ---- step execution

    fn execute(&mut self, steps: &[Step]) -> Result<()> {
        for step in steps {
            self.checkpoint()?;
            match step {
                Step::Joints(angles, params) => self.arm.move_joints(*angles, *params)?,
                Step::Linear(pose, params) => self.arm.move_linear(*pose, *params)?,
                Step::Relative(offset, params) => self.arm.move_relative(*offset, *params)?,
                Step::Tool(offset, params) => self.arm.move_tool(*offset, *params)?,
                Step::Gripper(action) => self.arm.gripper(*action)?,
                Step::Digital(io, value) => self.arm.set_digital_output(*io, *value)?,
                Step::Analog(io, value) => self.arm.set_analog_output(*io, *value)?,
                Step::Pause(duration) => self.arm.pause(*duration)?,
                Step::Override(enabled) => self.state.set_manual_override(*enabled),
            }
        }
        self.arm.settle()
    }

    /// Fold pending decisions into the running order; fail on stop or a dead arm.
    fn checkpoint(&mut self) -> Result<()> {
        while let Some(envelope) = self.inbound.try_recv() {
            match envelope.command {
                Command::ScriptStop => return Err(StopRequested.into()),
                Command::Proceed(decision) => match self.order.as_mut() {
                    Some(order) => order.proceed = Some(decision),
                    None => log::debug!("proceed {:?} ignored during {}", decision, self.phase),
                },
                Command::Sealing(decision) => match self.order.as_mut() {
                    Some(order) => order.sealing = Some(decision),
                    None => log::debug!("sealing {:?} ignored during {}", decision, self.phase),
                },
                other => log::info!("busy with {}, dropping {:?}", self.phase, other),
            }
        }
        if !self.state.is_alive() {
            return Err(ActuatorFault {
                operation: "checkpoint",
                code: self.arm.error_code(),
            }
            .into());
        }
        Ok(())
    }

    /// Poll `probe` until it yields or `timeout` passes, draining commands meanwhile.
    fn wait_for<T>(&mut self, timeout: Duration, probe: impl Fn(&Self) -> Option<T>) -> Result<Option<T>> {
        let deadline = Instant::now() + timeout;
        loop {
            self.checkpoint()?;
            if let Some(value) = probe(self) {
                return Ok(Some(value));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(self.cfg.poll_interval.min(deadline - now));
        }
    }

    // ---- phases

    fn run_order(&mut self, order: OrderRequest) -> Result<()> {
        self.phase = ActuationPhase::RunningOrder;
        log::info!("order accepted: {:?}", order);
        let delay = order.start_delay;
        self.order = Some(order);
        let result = self.order_flow(delay);
        self.order = None;
        self.state.clear_zones();
        self.state.clear_seal();
        self.state.clear_trash();
        self.state.set_manual_override(false);
        result
    }

    fn order_flow(&mut self, delay: Duration) -> Result<()> {
        self.notify(Notification::IcecreamStart);
        self.wait_for(delay, |_| None::<()>)?;
        self.execute(&motions::home())?;

        let proceed = self.wait_for(self.cfg.proceed_timeout, |m| {
            m.order.as_ref().and_then(|o| o.proceed)
        })?;
        match proceed {
            Some(Decision::Go) => {}
            Some(Decision::Stop) => {
                log::info!("order stopped by client");
                self.notify(Notification::IcecreamCancel);
                return Ok(());
            }
            None => {
                log::warn!("no proceed decision within {:?}", self.cfg.proceed_timeout);
                self.notify(Notification::IcecreamCancel);
                return Ok(());
            }
        }

        let zone = self.wait_for(self.cfg.capsule_timeout, |m| m.state.active_zone())?;
        let Some(slot) = zone.as_deref().and_then(Slot::from_zone) else {
            log::warn!("no capsule slot latched ({:?}), cancelling", zone);
            self.notify(Notification::IcecreamCancel);
            return Ok(());
        };
        log::info!("capsule slot {:?}", slot);
        self.execute(&motions::grab_capsule(slot))?;

        let sealing_requested = self.order.as_ref().map_or(false, |o| o.sealing_check);
        if sealing_requested && !self.seal_check()? {
            self.execute(&motions::place_fail_capsule(slot))?;
            self.execute(&motions::home())?;
            self.notify(Notification::IcecreamCancel);
            return Ok(());
        }

        let with_topping = self.order.as_ref().map_or(true, |o| o.topping);
        self.execute(&motions::place_capsule())?;
        self.execute(&motions::grab_cup())?;
        self.execute(&motions::topping(slot, with_topping))?;
        self.execute(&motions::make_icecream(with_topping))?;
        self.execute(&motions::serve(slot))?;
        self.execute(&motions::trash_capsule())?;
        self.execute(&motions::home())?;
        self.notify(Notification::IcecreamFinish);
        Ok(())
    }

    /// Show the capsule to the camera and the client. Passes on `sealing_pass`
    /// or when vision has seen the capsule without its seal.
    fn seal_check(&mut self) -> Result<bool> {
        self.execute(&motions::check_sealing())?;
        self.notify(Notification::SealingCheck);
        let decision = self.wait_for(self.cfg.sealing_timeout, |m| {
            m.order.as_ref().and_then(|o| o.sealing)
        })?;
        let passed = decision == Some(Decision::Go) || self.state.seal_absent();
        log::info!("seal check: decision {:?}, passed {}", decision, passed);
        Ok(passed)
    }

    fn run_expressive(&mut self, motion: ExpressiveMotion) -> Result<()> {
        self.phase = ActuationPhase::Expressive(motion);
        let program = match motion {
            ExpressiveMotion::DanceRandom => {
                let dances = [ExpressiveMotion::DanceA, ExpressiveMotion::DanceB, ExpressiveMotion::DanceC];
                let dance = dances[rand::thread_rng().gen_range(0..dances.len())];
                log::info!("dance_random picked {}", dance);
                self.notify(Notification::PhaseStart(dance.keyword().to_string()));
                motions::expressive(dance)
            }
            motion => {
                self.notify(Notification::PhaseStart(motion.keyword().to_string()));
                motions::expressive(motion)
            }
        };
        self.execute(&program)?;
        self.notify(Notification::PhaseFinish(motion.keyword().to_string()));
        Ok(())
    }

    fn clean_mode(&mut self, enable: bool) -> Result<()> {
        self.phase = ActuationPhase::CleanMode;
        if enable {
            self.notify(Notification::PhaseStart("clean_mode".to_string()));
        }
        self.arm.set_digital_output(motions::CLEAN_MODE_OUTPUT, enable)?;
        if !enable {
            self.notify(Notification::PhaseFinish("clean_mode".to_string()));
        }
        Ok(())
    }

    fn run_trash_mode(&mut self) -> Result<()> {
        self.phase = ActuationPhase::TrashPickup;
        self.notify(Notification::PhaseStart("trash_mode".to_string()));
        self.execute(&motions::trash_prepare())?;
        let mut picked = 0usize;
        loop {
            self.state.clear_trash();
            let target = self.wait_for(self.cfg.trash_timeout, |m| m.state.trash_target())?;
            let Some(target) = target else {
                break;
            };
            log::info!(
                "trash cup at pixel ({:.0}, {:.0}) -> ({:.1}, {:.1}) mm",
                target.pixel.x,
                target.pixel.y,
                target.world.x,
                target.world.y
            );
            self.execute(&motions::trash_pickup(target.world))?;
            picked += 1;
        }
        self.state.clear_trash();
        log::info!("trash mode done: {} cup(s) removed", picked);
        self.notify(Notification::PhaseFinish("trash_mode".to_string()));
        Ok(())
    }
}

impl fmt::Debug for TaskStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStateMachine")
            .field("phase", &self.phase)
            .field("order", &self.order)
            .finish()
    }
}

/// Collects notifications in memory.
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<std::sync::Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow!("recording sink lock poisoned"))?
            .push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{ArmCall, SimHandle, SimulatedArm};
    use crate::channel::inbound_queue;
    use crate::perception::{PresenceLatch, Zone};
    use crate::PixelRect;
    use std::sync::mpsc::Sender;

    struct Rig {
        machine: TaskStateMachine,
        tx: Sender<Envelope>,
        sim: SimHandle,
        sink: RecordingSink,
        state: SharedState,
    }

    fn rig() -> Rig {
        let state = SharedState::new(
            vec![Zone::new("A", PixelRect::new(0.0, 0.0, 10.0, 10.0), Duration::from_secs(1))],
            PresenceLatch::new(PixelRect::new(0.0, 0.0, 10.0, 10.0)),
        );
        let sim = SimulatedArm::new();
        let handle = sim.handle();
        let arm = Arm::new(Box::new(sim), state.clone());
        let (tx, inbound) = inbound_queue();
        let sink = RecordingSink::new();
        let cfg = TaskConfig {
            proceed_timeout: Duration::from_millis(300),
            sealing_timeout: Duration::from_millis(200),
            capsule_timeout: Duration::from_millis(200),
            trash_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
        };
        Rig {
            machine: TaskStateMachine::new(arm, inbound, Arc::new(sink.clone()), cfg),
            tx,
            sim: handle,
            sink,
            state,
        }
    }

    fn send(tx: &Sender<Envelope>, command: Command) {
        tx.send(Envelope {
            command,
            received_at: Instant::now(),
        })
        .unwrap();
    }

    #[test]
    fn checkpoint_folds_decisions_into_order() -> Result<()> {
        let mut rig = rig();
        rig.machine.order = Some(OrderRequest::default());
        send(&rig.tx, Command::Proceed(Decision::Go));
        send(&rig.tx, Command::Sealing(Decision::Stop));
        send(&rig.tx, Command::Expressive(ExpressiveMotion::Greet));
        rig.machine.checkpoint()?;
        let order = rig.machine.order.clone().unwrap();
        assert_eq!(order.proceed, Some(Decision::Go));
        assert_eq!(order.sealing, Some(Decision::Stop));
        assert!(rig.machine.inbound.try_recv().is_none());
        Ok(())
    }

    #[test]
    fn proceed_timeout_cancels_after_homing() {
        let mut rig = rig();
        let result = rig.machine.run_order(OrderRequest::default());
        assert!(result.is_ok());
        assert_eq!(
            rig.sink.sent(),
            vec![Notification::IcecreamStart, Notification::IcecreamCancel]
        );
        assert!(rig
            .sim
            .calls()
            .iter()
            .any(|c| matches!(c, ArmCall::MoveJoints { angles, .. } if *angles == motions::HOME)));
    }

    #[test]
    fn go_without_latched_slot_cancels() {
        let mut rig = rig();
        let order = OrderRequest {
            proceed: Some(Decision::Go),
            ..OrderRequest::default()
        };
        assert!(rig.machine.run_order(order).is_ok());
        assert_eq!(
            rig.sink.sent().last(),
            Some(&Notification::IcecreamCancel)
        );
    }

    #[test]
    fn script_stop_sets_stopped_state() {
        let mut rig = rig();
        send(&rig.tx, Command::ScriptStop);
        assert_eq!(rig.machine.run(), TaskExit::Stopped);
        assert!(rig.sim.calls().contains(&ArmCall::SetState(STATE_STOPPED)));
        assert!(!rig.state.is_alive());
    }

    #[test]
    fn driver_failure_reports_fault() {
        let mut rig = rig();
        rig.sim.fail_next(21);
        send(&rig.tx, Command::Expressive(ExpressiveMotion::Greet));
        assert_eq!(rig.machine.run(), TaskExit::Faulted(21));
        assert_eq!(rig.machine.phase(), ActuationPhase::Faulted);
        assert_eq!(rig.sink.sent().last(), Some(&Notification::Fault(21)));
    }

    #[test]
    fn clean_mode_toggles_output() -> Result<()> {
        let mut rig = rig();
        rig.machine.clean_mode(true)?;
        rig.machine.clean_mode(false)?;
        let calls = rig.sim.calls();
        assert_eq!(calls[0], ArmCall::DigitalOutput { io: 1, value: true });
        assert_eq!(calls[1], ArmCall::DigitalOutput { io: 1, value: false });
        assert_eq!(
            rig.sink.sent(),
            vec![
                Notification::PhaseStart("clean_mode".into()),
                Notification::PhaseFinish("clean_mode".into())
            ]
        );
        Ok(())
    }
}
