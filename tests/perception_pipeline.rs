use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::{GrayImage, Luma};

use aris_controller::calibration::CalibrationSet;
use aris_controller::detect::{Detection, ObjectLabel, ScriptedDetector};
use aris_controller::ingest::{open_source, SourceConfig};
use aris_controller::perception::{
    run_perception_loop, MotionPermission, PresenceLatch, ProximityGuard, TrashTracker, Zone,
};
use aris_controller::{PerceptionEngine, PixelPoint, PixelRect, SharedState};

const WAIT: Duration = Duration::from_secs(5);

fn block_mask(x: std::ops::Range<u32>, y: std::ops::Range<u32>) -> GrayImage {
    GrayImage::from_fn(64, 48, |px, py| {
        if x.contains(&px) && y.contains(&py) {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

fn wait_until(what: &str, probe: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !probe() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn scripted_frames_drive_shared_state() {
    let dwell = Duration::from_millis(100);
    let state = SharedState::new(
        vec![
            Zone::new("A", PixelRect::from_xywh(455.0, 65.0, 95.0, 95.0), dwell),
            Zone::new("B", PixelRect::from_xywh(360.0, 65.0, 95.0, 95.0), dwell),
        ],
        PresenceLatch::new(PixelRect::from_xywh(450.0, 230.0, 110.0, 110.0)),
    );
    let engine = PerceptionEngine::new(
        Arc::new(CalibrationSet::default().fit().expect("calibration")),
        state.clone(),
        PixelRect::new(100.0, 20.0, 520.0, 210.0),
        TrashTracker::new(10.0, Duration::from_millis(100)),
        ProximityGuard::new(50.0, 300.0),
        0.7,
    );

    let now = Instant::now();
    let batch = vec![
        Detection::new(ObjectLabel::Capsule, 0.92, PixelRect::new(470.0, 80.0, 530.0, 140.0), now),
        Detection::new(ObjectLabel::Cup, 0.88, PixelRect::new(280.0, 100.0, 320.0, 140.0), now),
        // Below threshold: ignored.
        Detection::new(ObjectLabel::Capsule, 0.3, PixelRect::new(370.0, 80.0, 430.0, 140.0), now),
        Detection::new(ObjectLabel::Robot, 0.9, PixelRect::new(100.0, 100.0, 200.0, 200.0), now)
            .with_mask(block_mask(10..20, 10..20)),
        Detection::new(ObjectLabel::Human, 0.9, PixelRect::new(220.0, 100.0, 300.0, 200.0), now)
            .with_mask(block_mask(22..30, 10..20)),
    ];
    let mut detector = ScriptedDetector::new(vec![batch]).looping();

    let shutdown = Arc::new(AtomicBool::new(false));
    let worker = {
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            let mut source = open_source(SourceConfig {
                target_fps: 50,
                ..SourceConfig::default()
            })?;
            run_perception_loop(source.as_mut(), &mut detector, &engine, &shutdown)
        })
    };

    wait_until("zone A latch", || state.zone_flag("A") == Some(true));
    wait_until("trash target", || state.trash_target().is_some());
    wait_until("proximity hold", || {
        state.motion_permission() == MotionPermission::Hold
    });

    shutdown.store(true, Ordering::SeqCst);
    worker.join().expect("perception thread").expect("perception loop");

    assert_eq!(state.zone_flag("B"), Some(false));
    assert_eq!(state.active_zone().as_deref(), Some("A"));
    let target = state.trash_target().unwrap();
    assert_eq!(target.pixel, PixelPoint::new(300.0, 120.0));
    assert!(target.world.x.is_finite() && target.world.y.is_finite());
    assert!(state.last_distance() <= 50.0);
    assert!(!state.seal_absent());
}
