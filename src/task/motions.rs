//! Fixed motion programs for the workcell.
//!
//! Every program is a flat list of `Step`s; the task state machine executes
//! them one at a time and checks for stop requests between steps. Poses are
//! in the arm base frame (mm, degrees), joint targets in degrees.

use std::time::Duration;

use crate::actuator::{GripperAction, JointAngles, MotionParams, Pose};
use crate::channel::ExpressiveMotion;
use crate::WorldPoint;

#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    Joints(JointAngles, MotionParams),
    Linear(Pose, MotionParams),
    /// Cartesian offset from the current pose.
    Relative(Pose, MotionParams),
    /// Offset in the tool frame.
    Tool(Pose, MotionParams),
    Gripper(GripperAction),
    Digital(u8, bool),
    Analog(u8, f64),
    /// Controller-side pause once queued motion has finished.
    Pause(Duration),
    /// Ignore the proximity hold while the dispenser is pressed.
    Override(bool),
}

/// Capsule slot on the jig, one per pickup zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
    C,
}

impl Slot {
    pub fn from_zone(name: &str) -> Option<Self> {
        match name {
            "A" | "a" => Some(Self::A),
            "B" | "b" => Some(Self::B),
            "C" | "c" => Some(Self::C),
            _ => None,
        }
    }
}

pub const HOME: JointAngles = [179.2, -42.1, 7.4, 186.7, 41.5, -1.6];

const JIG_A_GRAB: Pose = Pose::new(-257.3, -138.3, 198.0, 68.3, 86.1, -47.0);
const JIG_B_GRAB: Pose = Pose::new(-152.3, -129.0, 198.0, 4.8, 89.0, -90.7);
const JIG_C_GRAB: Pose = Pose::new(-76.6, -144.6, 198.0, 5.7, 88.9, -50.1);

const SEALING_CHECK: Pose = Pose::new(-136.8, 71.5, 307.6, 69.6, -73.9, -59.0);
const CAPSULE_PLACE: Pose = Pose::new(234.9, 135.9, 465.9, 133.6, 87.2, -142.1);
const BEFORE_CAPSULE_PLACE: Pose = Pose::new(234.9, 135.9, 490.9, 133.6, 87.2, -142.1);
const CUP_GRAB: Pose = Pose::new(214.0, -100.2, 145.0, -25.6, -88.5, 95.8);

const TOPPING_APPROACH: JointAngles = [36.6, -36.7, 21.1, 85.6, 59.4, 44.5];
const TOPPING_A: Pose = Pose::new(-200.3, 162.8, 359.9, -31.7, 87.8, 96.1);
const TOPPING_B: JointAngles = [106.5, -39.7, 15.0, 158.7, 40.4, 16.9];
const TOPPING_C: Pose = Pose::new(43.6, 137.9, 350.1, -92.8, 87.5, 5.3);
const ICECREAM_WITH_TOPPING: Pose = Pose::new(168.7, 175.6, 359.5, 43.9, 88.3, 83.3);
const ICECREAM_NO_TOPPING: JointAngles = [48.4, -13.8, 36.3, 193.6, 42.0, -9.2];

const SERVE_A: Pose = Pose::new(-258.7, -136.4, 208.2, 43.4, 88.7, -72.2);
const SERVE_B: Pose = Pose::new(-166.8, -126.5, 200.9, -45.2, 89.2, -133.6);
const SERVE_C: Pose = Pose::new(-63.1, -138.2, 199.5, -45.5, 88.1, -112.1);

const CAPSULE_GRAB: Pose = Pose::new(234.2, 129.8, 464.5, -153.7, 87.3, -68.7);

/// Dispenser lever.
const IO_PRESS: u8 = 3;

/// Output driving the cleaning cycle.
pub const CLEAN_MODE_OUTPUT: u8 = 1;

fn joints(angles: JointAngles) -> Step {
    Step::Joints(angles, MotionParams::joint())
}

fn joints_at(angles: JointAngles, speed: f64, acceleration: f64) -> Step {
    Step::Joints(angles, MotionParams::joint().speed(speed, acceleration))
}

fn joints_blend(angles: JointAngles, speed: f64, acceleration: f64, radius: f64) -> Step {
    Step::Joints(
        angles,
        MotionParams::joint()
            .speed(speed, acceleration)
            .radius(radius)
            .no_wait(),
    )
}

fn linear(pose: Pose) -> Step {
    Step::Linear(pose, MotionParams::linear())
}

fn linear_blend(pose: Pose, radius: f64) -> Step {
    Step::Linear(pose, MotionParams::linear().radius(radius).no_wait())
}

fn lift(dz: f64) -> Step {
    Step::Relative(
        Pose::new(0.0, 0.0, dz, 0.0, 0.0, 0.0),
        MotionParams::linear().radius(-1.0),
    )
}

fn lift_no_wait(dz: f64) -> Step {
    Step::Relative(
        Pose::new(0.0, 0.0, dz, 0.0, 0.0, 0.0),
        MotionParams::linear().radius(0.0).no_wait(),
    )
}

fn pause_ms(ms: u64) -> Step {
    Step::Pause(Duration::from_millis(ms))
}

fn grip(action: GripperAction, settle_ms: u64) -> Vec<Step> {
    vec![Step::Gripper(action), pause_ms(settle_ms)]
}

fn jig_grab(slot: Slot) -> Pose {
    match slot {
        Slot::A => JIG_A_GRAB,
        Slot::B => JIG_B_GRAB,
        Slot::C => JIG_C_GRAB,
    }
}

/// Drop-off pose for a rejected capsule: the grab pose flipped over and lowered.
pub fn reverse_for_fail(grab: Pose) -> Pose {
    Pose::new(
        grab.x,
        grab.y,
        grab.z - 10.0,
        -grab.roll,
        -grab.pitch,
        grab.yaw - 180.0,
    )
}

// ----------------------------------------------------------------------------
// Order programs
// ----------------------------------------------------------------------------

pub fn home() -> Vec<Step> {
    vec![
        Step::Analog(0, 0.0),
        Step::Analog(1, 0.0),
        Step::Digital(IO_PRESS, false),
        joints_at(HOME, 80.0, 200.0),
    ]
}

pub fn grab_capsule(slot: Slot) -> Vec<Step> {
    let mut steps = vec![Step::Analog(0, 5.0), Step::Analog(1, 5.0)];
    steps.extend(grip(GripperAction::Stop, 500));
    if slot != Slot::A {
        steps.push(joints_at([176.0, 31.7, 31.0, 76.7, 91.2, -1.9], 100.0, 100.0));
    }
    steps.extend(grip(GripperAction::Open, 1000));
    match slot {
        Slot::A => steps.push(joints_blend([179.5, 33.5, 32.7, 113.0, 93.1, -2.3], 100.0, 100.0, 20.0)),
        Slot::B => {}
        Slot::C => steps.push(joints_blend([182.6, 27.8, 27.7, 55.7, 90.4, -6.4], 100.0, 100.0, 20.0)),
    }
    steps.push(linear(jig_grab(slot)));
    steps.extend(grip(GripperAction::Close, 1000));
    if slot == Slot::C {
        steps.push(lift_no_wait(150.0));
        steps.push(Step::Tool(
            Pose::new(0.0, 0.0, -90.0, 0.0, 0.0, 0.0),
            MotionParams::linear().speed(200.0, 1000.0).no_wait(),
        ));
    } else {
        steps.push(lift_no_wait(100.0));
    }
    steps.push(joints_blend([145.0, -18.6, 10.5, 97.5, 81.4, 145.0], 180.0, 500.0, 30.0));
    steps
}

pub fn check_sealing() -> Vec<Step> {
    vec![linear(SEALING_CHECK)]
}

pub fn place_fail_capsule(slot: Slot) -> Vec<Step> {
    let approach = match slot {
        Slot::A => [177.3, 5.5, 12.9, 133.6, 81.3, 183.5],
        Slot::B => [159.5, 11.8, 22.2, 75.6, 92.8, 186.6],
        Slot::C => [176.9, -2.2, 15.3, 69.3, 87.5, 195.5],
    };
    let mut steps = vec![
        joints_blend(approach, 100.0, 100.0, 20.0),
        linear(reverse_for_fail(jig_grab(slot))),
    ];
    steps.extend(grip(GripperAction::Open, 1000));
    steps.extend(grip(GripperAction::Stop, 500));
    steps.push(lift_no_wait(100.0));
    steps
}

pub fn place_capsule() -> Vec<Step> {
    let mut steps = vec![
        joints_blend([81.0, -10.8, 6.9, 103.6, 88.6, 9.6], 100.0, 100.0, 40.0),
        joints_blend([10.0, -20.8, 7.1, 106.7, 79.9, 26.0], 100.0, 100.0, 50.0),
        joints_blend([8.4, -42.7, 23.7, 177.4, 31.6, 3.6], 100.0, 100.0, 40.0),
        joints_at([8.4, -32.1, 55.1, 96.6, 29.5, 81.9], 100.0, 100.0),
        linear(BEFORE_CAPSULE_PLACE),
        linear(CAPSULE_PLACE),
        Step::Analog(0, 0.0),
        Step::Analog(1, 5.0),
    ];
    steps.extend(grip(GripperAction::Open, 2000));
    steps.extend(grip(GripperAction::Stop, 500));
    steps
}

pub fn grab_cup() -> Vec<Step> {
    let mut steps = vec![linear_blend(
        Pose::new(233.4, 10.3, 471.1, -172.2, 87.3, -84.5),
        20.0,
    )];
    steps.extend(grip(GripperAction::Open, 1000));
    steps.push(Step::Joints(
        [-2.8, -2.5, 45.3, 119.8, -79.2, -18.8],
        MotionParams::joint().speed(100.0, 100.0).radius(30.0),
    ));
    steps.push(linear_blend(
        Pose::new(195.0, -96.5, 200.8, -168.0, -87.1, -110.5),
        10.0,
    ));
    steps.push(linear(CUP_GRAB));
    steps.extend(grip(GripperAction::Close, 2000));
    steps.push(lift(120.0));
    steps.push(joints_at([2.9, -31.0, 33.2, 125.4, -30.4, -47.2], 100.0, 100.0));
    steps.push(Step::Analog(0, 5.0));
    steps.push(Step::Analog(1, 5.0));
    steps
}

/// Topping station for the slot, then under the dispenser. Holds the
/// proximity override from the moment the lever is pressed.
pub fn topping(slot: Slot, with_topping: bool) -> Vec<Step> {
    if !with_topping {
        return vec![
            Step::Override(true),
            Step::Digital(IO_PRESS, true),
            joints(ICECREAM_NO_TOPPING),
        ];
    }
    let mut steps = vec![joints(TOPPING_APPROACH)];
    match slot {
        Slot::C => {
            steps.push(linear(TOPPING_C));
            steps.push(Step::Digital(2, true));
            steps.push(lift(20.0));
            steps.push(pause_ms(2000));
            steps.push(Step::Override(true));
            steps.push(Step::Digital(IO_PRESS, true));
            steps.push(pause_ms(2000));
            steps.push(Step::Digital(2, false));
            steps.push(lift_no_wait(-20.0));
        }
        Slot::B => {
            steps.push(joints_blend([55.8, -48.2, 14.8, 86.1, 60.2, 58.7], 20.0, 500.0, 20.0));
            steps.push(joints(TOPPING_B));
            steps.push(Step::Digital(1, true));
            steps.push(lift(20.0));
            steps.push(pause_ms(1000));
            steps.push(Step::Override(true));
            steps.push(Step::Digital(IO_PRESS, true));
            steps.push(pause_ms(3000));
            steps.push(Step::Digital(1, false));
            steps.push(lift_no_wait(-20.0));
            steps.push(joints_blend([87.5, -48.2, 13.5, 125.1, 44.5, 46.2], 20.0, 500.0, 10.0));
            steps.push(linear_blend(TOPPING_C, 10.0));
        }
        Slot::A => {
            steps.push(linear(TOPPING_A));
            steps.push(Step::Digital(0, true));
            steps.push(pause_ms(4000));
            steps.push(Step::Override(true));
            steps.push(Step::Digital(IO_PRESS, true));
            steps.push(Step::Digital(0, false));
            steps.push(joints([130.0, -33.1, 12.5, 194.3, 51.0, 0.0]));
            steps.push(linear_blend(Pose::new(-38.2, 132.2, 333.9, -112.9, 86.3, -6.6), 10.0));
            steps.push(linear_blend(TOPPING_C, 10.0));
        }
    }
    steps.push(linear(ICECREAM_WITH_TOPPING));
    steps
}

/// Lower the cup under the dispenser, then release the lever and the override.
pub fn make_icecream(with_topping: bool) -> Vec<Step> {
    vec![
        pause_ms(if with_topping { 7000 } else { 10000 }),
        lift(-20.0),
        pause_ms(3000),
        lift(-10.0),
        lift(-50.0),
        pause_ms(1000),
        Step::Digital(IO_PRESS, false),
        Step::Override(false),
    ]
}

pub fn serve(slot: Slot) -> Vec<Step> {
    let mut steps = vec![
        joints_blend([18.2, -12.7, 8.3, 90.3, 88.1, 23.6], 100.0, 100.0, 20.0),
        joints_at([146.9, -12.7, 8.3, 91.0, 89.3, 22.1], 100.0, 100.0),
    ];
    let (lower, release, back, clear, serve_pose) = match slot {
        Slot::A => (
            -18.0,
            Pose::new(-256.2, -126.6, 210.1, -179.2, 77.2, 66.9),
            Pose::new(-242.8, -96.3, 210.5, -179.2, 77.2, 66.9),
            Pose::new(-189.7, -26.0, 193.3, -28.1, 88.8, -146.0),
            SERVE_A,
        ),
        Slot::B => (
            -13.0,
            Pose::new(-165.0, -122.7, 200.0, -178.7, 80.7, 92.5),
            Pose::new(-165.9, -81.9, 200.0, -178.7, 80.7, 92.5),
            Pose::new(-168.5, -33.2, 192.8, -92.9, 86.8, -179.3),
            SERVE_B,
        ),
        Slot::C => (
            -12.0,
            Pose::new(-75.0, -132.8, 208.0, -176.8, 76.1, 123.0),
            Pose::new(-92.0, -107.5, 208.0, -176.8, 76.1, 123.0),
            Pose::new(-98.1, -52.1, 191.4, -68.4, 86.4, -135.0),
            SERVE_C,
        ),
    };
    if slot == Slot::C {
        steps.push(joints_at([177.6, 0.2, 13.5, 70.0, 94.9, 13.8], 100.0, 100.0));
    }
    steps.push(linear(serve_pose));
    steps.push(lift(lower));
    steps.extend(grip(GripperAction::Open, 1000));
    steps.push(linear(release));
    steps.extend(grip(GripperAction::Stop, 500));
    steps.push(linear(back));
    steps.push(linear(clear));
    steps.push(pause_ms(500));
    steps.push(Step::Joints(
        [169.6, -8.7, 13.8, 85.8, 93.7, 19.0],
        MotionParams::joint().speed(100.0, 100.0).radius(10.0),
    ));
    steps
}

pub fn trash_capsule() -> Vec<Step> {
    let mut steps = vec![
        joints_blend([51.2, -8.7, 13.8, 95.0, 86.0, 17.0], 150.0, 300.0, 50.0),
        joints_at([-16.2, -19.3, 42.7, 82.0, 89.1, 55.0], 150.0, 300.0),
        Step::Gripper(GripperAction::Open),
        joints_at([-19.9, -19.1, 48.7, 87.2, 98.7, 60.0], 150.0, 300.0),
        linear(Pose::new(222.8, 0.9, 470.0, -153.7, 87.3, -68.7)),
        linear(CAPSULE_GRAB),
    ];
    steps.extend(grip(GripperAction::Close, 1000));
    steps.push(lift(30.0));
    steps.push(linear(Pose::new(221.9, -5.5, 500.4, -153.7, 87.3, -68.7)));
    steps.push(joints_blend([-10.7, -2.4, 53.5, 50.4, 78.1, 63.0], 60.0, 100.0, 10.0));
    steps.push(joints_at([18.0, 11.2, 40.4, 90.4, 58.7, -148.8], 160.0, 1000.0));
    steps.push(Step::Gripper(GripperAction::Open));
    steps.push(joints_blend([25.2, 15.2, 42.7, 83.2, 35.0, -139.8], 160.0, 1000.0, 0.0));
    steps.push(joints_blend([18.0, 11.2, 40.4, 90.4, 58.7, -148.8], 160.0, 1000.0, 0.0));
    steps.push(joints_at([25.2, 15.2, 42.7, 83.2, 35.0, -139.8], 160.0, 1000.0));
    steps.push(Step::Gripper(GripperAction::Stop));
    steps.push(joints_blend([28.3, -9.0, 12.6, 85.9, 78.5, 20.0], 120.0, 1000.0, 30.0));
    steps.push(joints_blend([149.3, -9.4, 10.9, 114.7, 69.1, 26.1], 120.0, 1000.0, 50.0));
    steps.push(joints_at(HOME, 120.0, 1000.0));
    steps
}

// ----------------------------------------------------------------------------
// Trash pickup
// ----------------------------------------------------------------------------

/// Gripper reset and home before the first pickup.
pub fn trash_prepare() -> Vec<Step> {
    let mut steps = grip(GripperAction::Open, 1000);
    steps.push(Step::Gripper(GripperAction::Stop));
    steps.push(joints_at(HOME, 100.0, 100.0));
    steps
}

/// Pick the cup at `target` (arm base frame) and drop it in the bin.
pub fn trash_pickup(target: WorldPoint) -> Vec<Step> {
    let tcp = MotionParams::linear().speed(100.0, 500.0);
    let mut steps = vec![
        joints_at([270.0, -15.9, 12.1, 180.0, 49.9, 0.0], 100.0, 100.0),
        Step::Linear(Pose::new(target.x, -189.0, 262.6, 180.0, 77.9, 90.0), tcp),
        pause_ms(500),
        Step::Linear(Pose::new(target.x, target.y + 130.0, 262.6, 180.0, 77.9, 90.0), tcp),
    ];
    steps.extend(grip(GripperAction::Close, 2000));
    steps.push(lift(100.0));
    steps.push(joints_at([267.6, -18.8, 37.7, 180.0, 20.5, 0.0], 100.0, 100.0));
    steps.push(joints_blend(HOME, 100.0, 100.0, 0.0));
    steps.push(joints_blend([51.0, -81.1, 1.6, 180.0, -1.7, 0.0], 100.0, 100.0, 0.0));
    steps.push(joints_at([51.0, -11.8, 20.1, 177.8, 30.9, 180.0], 100.0, 100.0));
    steps.extend(grip(GripperAction::Open, 2000));
    steps.push(Step::Gripper(GripperAction::Stop));
    steps.push(joints_blend([51.0, -81.1, 1.6, 180.0, -1.7, 0.0], 100.0, 100.0, 0.0));
    steps.push(joints_at(HOME, 100.0, 100.0));
    steps
}

// ----------------------------------------------------------------------------
// Expressive motions
// ----------------------------------------------------------------------------

fn dance_a() -> Vec<Step> {
    let mut steps = vec![joints_at(HOME, 60.0, 300.0)];
    for _ in 0..3 {
        steps.push(joints_at([212.0, -21.0, 112.0, 207.0, -0.8, 7.3], 60.0, 300.0));
        steps.push(joints_at([212.0, -38.0, 100.3, 180.4, -6.4, 6.0], 60.0, 300.0));
    }
    steps.push(joints_blend([329.0, -42.1, 7.4, 186.7, 41.5, -1.6], 60.0, 300.0, 0.0));
    for _ in 0..3 {
        steps.push(joints_blend([329.0, -21.0, 112.0, 207.0, -0.8, 7.3], 60.0, 300.0, 0.0));
        steps.push(joints_blend([329.0, -38.0, 100.3, 180.4, -6.4, 6.0], 60.0, 300.0, 0.0));
    }
    steps.push(joints_at(HOME, 60.0, 200.0));
    steps
}

fn dance_b() -> Vec<Step> {
    let mut steps = vec![joints_at(HOME, 70.0, 200.0)];
    for _ in 0..3 {
        steps.push(joints_at([220.7, -39.1, 67.0, 268.3, -40.0, -91.8], 70.0, 200.0));
        steps.push(joints_at([183.0, -39.1, 102.7, 220.0, -11.6, -140.0], 70.0, 200.0));
    }
    steps.push(joints_at(HOME, 70.0, 200.0));
    steps
}

fn dance_c() -> Vec<Step> {
    const UP: JointAngles = [180.0, 70.0, 250.0, 173.1, 0.0, -135.0];
    const DOWN: JointAngles = [180.0, -70.0, 110.0, 180.0, 0.0, 135.0];
    let mut steps = vec![joints_at(HOME, 150.0, 700.0)];
    for _ in 0..3 {
        steps.push(joints_blend(UP, 150.0, 700.0, 30.0));
        steps.push(joints_blend(DOWN, 150.0, 700.0, 30.0));
    }
    steps.push(joints_blend(UP, 150.0, 700.0, 30.0));
    steps.push(joints_at(HOME, 150.0, 700.0));
    steps
}

fn come_on() -> Vec<Step> {
    const WAVE: [(f64, f64, f64); 16] = [
        (70.0, 220.0, 60.0),
        (62.0, 222.0, 20.0),
        (55.0, 222.0, 60.0),
        (45.0, 222.0, 20.0),
        (35.0, 224.0, 60.0),
        (25.0, 224.0, 20.0),
        (15.0, 226.0, 60.0),
        (5.0, 226.0, 20.0),
        (0.0, 228.0, 60.0),
        (5.0, 230.0, 20.0),
        (20.0, 226.0, 60.0),
        (35.0, 226.0, 20.0),
        (45.0, 228.0, 60.0),
        (55.0, 226.0, 20.0),
        (65.0, 224.0, 60.0),
        (70.0, 222.0, 20.0),
    ];
    let mut steps = vec![
        joints_at(HOME, 80.0, 400.0),
        joints_blend([180.0, 70.0, 220.0, 90.0, 20.0, 0.0], 80.0, 400.0, 40.0),
    ];
    for _ in 0..2 {
        for (shoulder, elbow, wrist) in WAVE {
            steps.push(joints_blend([180.0, shoulder, elbow, 90.0, wrist, 0.0], 80.0, 400.0, 30.0));
        }
    }
    steps.push(joints_blend([180.0, 65.0, 222.0, 90.0, 60.0, 0.0], 80.0, 400.0, 30.0));
    steps.push(joints_at(HOME, 80.0, 400.0));
    steps
}

fn greet() -> Vec<Step> {
    const RAISED: JointAngles = [178.9, -0.7, 179.9, 181.5, -1.9, -92.6];
    const LEFT: JointAngles = [178.9, -0.7, 179.9, 180.9, -28.3, -92.8];
    const RIGHT: JointAngles = [178.9, -0.7, 179.9, 185.4, 30.8, -94.9];
    let mut steps = vec![joints_at(RAISED, 100.0, 350.0)];
    for _ in 0..3 {
        steps.push(joints_at(LEFT, 100.0, 350.0));
        steps.push(joints_at(RIGHT, 100.0, 350.0));
    }
    steps.push(joints_at(RAISED, 100.0, 350.0));
    steps
}

fn sleep() -> Vec<Step> {
    const REST: JointAngles = [179.0, -17.7, 29.0, 177.8, 43.8, -1.4];
    const BREATHE: JointAngles = [179.0, -10.2, 24.0, 178.2, 39.2, -2.0];
    let mut steps = Vec::new();
    for _ in 0..2 {
        steps.push(joints_at(REST, 20.0, 200.0));
        steps.push(joints_at(BREATHE, 5.0, 5.0));
    }
    steps.push(joints_at(REST, 30.0, 300.0));
    for _ in 0..3 {
        steps.push(joints_at([179.0, -17.7, 29.0, 199.8, 43.4, -11.0], 180.0, 1000.0));
        steps.push(joints_at([179.0, -17.7, 29.0, 157.3, 43.2, 12.7], 180.0, 1000.0));
    }
    steps.push(joints_at(REST, 20.0, 200.0));
    steps.push(pause_ms(2000));
    steps
}

/// Program for a concrete expressive motion. `DanceRandom` has no program of
/// its own; the caller picks one of the dances first.
pub fn expressive(motion: ExpressiveMotion) -> Vec<Step> {
    let mut steps = match motion {
        ExpressiveMotion::Breath => return vec![pause_ms(5000)],
        ExpressiveMotion::Greet => greet(),
        ExpressiveMotion::DanceA => dance_a(),
        ExpressiveMotion::DanceB => dance_b(),
        ExpressiveMotion::DanceC => dance_c(),
        ExpressiveMotion::Sleep => sleep(),
        ExpressiveMotion::ComeOn => return come_on(),
        ExpressiveMotion::DanceRandom => return Vec::new(),
    };
    steps.extend(home());
    steps
}
