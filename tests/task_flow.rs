use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use aris_controller::actuator::{ArmCall, SimHandle, SimulatedArm};
use aris_controller::channel::{
    inbound_queue, Command, Decision, Envelope, ExpressiveMotion, Notification, OrderRequest,
};
use aris_controller::perception::{PresenceLatch, TrashCandidate, Zone};
use aris_controller::task::{motions, RecordingSink, Step, TaskConfig, TaskExit};
use aris_controller::{Arm, PixelPoint, PixelRect, SharedState, TaskStateMachine, WorldPoint};

const WAIT: Duration = Duration::from_secs(5);

struct Workcell {
    tx: Sender<Envelope>,
    sim: SimHandle,
    sink: RecordingSink,
    state: SharedState,
    task: JoinHandle<TaskExit>,
}

fn start(cfg: TaskConfig) -> Workcell {
    let zones = ["A", "B", "C"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let x = 455.0 - 95.0 * i as f64;
            Zone::new(*name, PixelRect::from_xywh(x, 65.0, 95.0, 95.0), Duration::from_secs(2))
        })
        .collect();
    let state = SharedState::new(
        zones,
        PresenceLatch::new(PixelRect::from_xywh(450.0, 230.0, 110.0, 110.0)),
    );
    let sim = SimulatedArm::new();
    let handle = sim.handle();
    let arm = Arm::new(Box::new(sim), state.clone());
    let (tx, inbound) = inbound_queue();
    let sink = RecordingSink::new();
    let mut machine = TaskStateMachine::new(arm, inbound, std::sync::Arc::new(sink.clone()), cfg);
    let task = thread::spawn(move || machine.run());
    Workcell {
        tx,
        sim: handle,
        sink,
        state,
        task,
    }
}

fn fast_config() -> TaskConfig {
    TaskConfig {
        proceed_timeout: Duration::from_secs(2),
        sealing_timeout: Duration::from_millis(300),
        capsule_timeout: Duration::from_millis(300),
        trash_timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(10),
    }
}

fn send(tx: &Sender<Envelope>, command: Command) {
    tx.send(Envelope {
        command,
        received_at: Instant::now(),
    })
    .unwrap();
}

fn wait_for_notification(sink: &RecordingSink, wanted: &Notification) {
    let deadline = Instant::now() + WAIT;
    while !sink.sent().contains(wanted) {
        assert!(Instant::now() < deadline, "never saw {:?}, got {:?}", wanted, sink.sent());
        thread::sleep(Duration::from_millis(5));
    }
}

/// Latches are cleared just after the closing notification goes out.
fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

fn latch_zone(state: &SharedState, name: &str) {
    state.with_zones(|zones| {
        for zone in zones.iter_mut().filter(|zone| zone.name == name) {
            zone.flag = true;
        }
    });
}

fn finish(cell: Workcell) -> TaskExit {
    cell.state.mark_dead("test finished");
    cell.task.join().expect("task thread")
}

#[test]
fn full_order_runs_after_go_and_clears_latches() {
    let cell = start(fast_config());
    latch_zone(&cell.state, "B");

    send(&cell.tx, Command::Order(OrderRequest::default()));
    wait_for_notification(&cell.sink, &Notification::IcecreamStart);
    // Not a decision: dropped while the order waits for one.
    send(&cell.tx, Command::Expressive(ExpressiveMotion::Greet));
    send(&cell.tx, Command::Proceed(Decision::Go));
    wait_for_notification(&cell.sink, &Notification::IcecreamFinish);

    assert_eq!(
        cell.sink.sent(),
        vec![Notification::IcecreamStart, Notification::IcecreamFinish]
    );
    wait_until("latches cleared", || {
        cell.state.zone_flag("B") == Some(false) && !cell.state.manual_override()
    });

    let calls = cell.sim.calls();
    assert!(calls.contains(&ArmCall::DigitalOutput { io: 3, value: true }));
    assert!(calls.contains(&ArmCall::DigitalOutput { io: 3, value: false }));
    assert!(matches!(
        calls.last(),
        Some(ArmCall::MoveJoints { angles, .. }) if *angles == motions::HOME
    ));

    assert_eq!(finish(cell), TaskExit::Halted);
}

#[test]
fn sealing_reject_returns_capsule_and_cancels() {
    let cell = start(fast_config());
    latch_zone(&cell.state, "A");

    let order = OrderRequest {
        sealing_check: true,
        proceed: Some(Decision::Go),
        ..OrderRequest::default()
    };
    send(&cell.tx, Command::Order(order));
    wait_for_notification(&cell.sink, &Notification::SealingCheck);
    send(&cell.tx, Command::Sealing(Decision::Stop));
    wait_for_notification(&cell.sink, &Notification::IcecreamCancel);

    assert_eq!(
        cell.sink.sent(),
        vec![
            Notification::IcecreamStart,
            Notification::SealingCheck,
            Notification::IcecreamCancel
        ]
    );
    assert!(!cell.sim.calls().contains(&ArmCall::DigitalOutput { io: 3, value: true }));
    wait_until("zone A cleared", || cell.state.zone_flag("A") == Some(false));

    assert_eq!(finish(cell), TaskExit::Halted);
}

#[test]
fn seal_absent_latch_passes_the_check() {
    let cell = start(fast_config());
    latch_zone(&cell.state, "C");
    cell.state.set_seal_absent();

    let order = OrderRequest {
        sealing_check: true,
        proceed: Some(Decision::Go),
        topping: false,
        ..OrderRequest::default()
    };
    send(&cell.tx, Command::Order(order));
    wait_for_notification(&cell.sink, &Notification::IcecreamFinish);

    assert_eq!(
        cell.sink.sent(),
        vec![
            Notification::IcecreamStart,
            Notification::SealingCheck,
            Notification::IcecreamFinish
        ]
    );
    wait_until("seal latch cleared", || !cell.state.seal_absent());
    // Slot C backs the capsule out along the tool axis.
    assert!(cell
        .sim
        .calls()
        .iter()
        .any(|call| matches!(call, ArmCall::MoveTool { pose, wait: false } if pose.z == -90.0)));

    assert_eq!(finish(cell), TaskExit::Halted);
}

#[test]
fn stop_decision_cancels_before_any_capsule_grab() {
    let cell = start(fast_config());
    latch_zone(&cell.state, "A");

    send(&cell.tx, Command::Order(OrderRequest::default()));
    wait_for_notification(&cell.sink, &Notification::IcecreamStart);
    send(&cell.tx, Command::Proceed(Decision::Stop));
    wait_for_notification(&cell.sink, &Notification::IcecreamCancel);

    assert_eq!(
        cell.sink.sent(),
        vec![Notification::IcecreamStart, Notification::IcecreamCancel]
    );
    wait_until("latches cleared", || {
        cell.state.zone_flag("A") == Some(false) && !cell.state.manual_override()
    });

    let calls = cell.sim.calls();
    assert!(!calls.iter().any(|call| matches!(call, ArmCall::Gripper(_))));
    assert!(!calls
        .iter()
        .any(|call| matches!(call, ArmCall::MoveLinear { .. } | ArmCall::MoveTool { .. })));

    assert_eq!(finish(cell), TaskExit::Halted);
}

#[test]
fn trash_mode_picks_up_stable_target() {
    let cell = start(fast_config());
    let target = TrashCandidate {
        pixel: PixelPoint::new(300.0, 150.0),
        world: WorldPoint::new(-120.0, -330.0),
    };

    send(&cell.tx, Command::TrashMode);
    wait_for_notification(&cell.sink, &Notification::PhaseStart("trash_mode".into()));
    thread::sleep(Duration::from_millis(100));
    cell.state.with_trash(|trash| {
        trash.detected = true;
        trash.target = Some(target);
    });
    wait_for_notification(&cell.sink, &Notification::PhaseFinish("trash_mode".into()));

    let approach = motions::trash_pickup(target.world)
        .into_iter()
        .find_map(|step| match step {
            Step::Linear(pose, _) => Some(pose),
            _ => None,
        })
        .unwrap();
    assert!(cell
        .sim
        .calls()
        .iter()
        .any(|call| matches!(call, ArmCall::MoveLinear { pose, .. } if *pose == approach)));
    assert!(cell.state.trash_target().is_none());

    assert_eq!(finish(cell), TaskExit::Halted);
}

#[test]
fn expressive_motion_reports_start_and_finish() {
    let cell = start(fast_config());

    send(&cell.tx, Command::Expressive(ExpressiveMotion::Greet));
    wait_for_notification(&cell.sink, &Notification::PhaseFinish("greet".into()));
    assert_eq!(
        cell.sink.sent(),
        vec![
            Notification::PhaseStart("greet".into()),
            Notification::PhaseFinish("greet".into())
        ]
    );

    assert_eq!(finish(cell), TaskExit::Halted);
}

#[test]
fn script_stop_ends_a_running_order() {
    let cell = start(fast_config());

    send(&cell.tx, Command::Order(OrderRequest::default()));
    wait_for_notification(&cell.sink, &Notification::IcecreamStart);
    send(&cell.tx, Command::ScriptStop);

    let exit = cell.task.join().expect("task thread");
    assert_eq!(exit, TaskExit::Stopped);
    assert!(!cell.state.is_alive());
    assert!(cell.sim.calls().contains(&ArmCall::SetState(4)));
}
