//! Perception loop: detections → zone latches, trash target, proximity gate.
//!
//! Dispatch is by label:
//! - `capsule` feeds the slot zones (dwell debounced)
//! - `capsule_not_label` feeds the seal-check presence latch
//! - `cup` inside the trash region becomes a trash candidate
//! - `robot` / `human` masks feed the proximity guard
//!
//! Everything lands in `SharedState`. Bad frames, failed detector calls and
//! malformed masks are logged and skipped; none of them stop the loop.

pub mod contour;
pub mod proximity;
pub mod trash;
pub mod zone;

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::calibration::CoordinateMapper;
use crate::detect::{Detection, DetectorBackend, ObjectLabel};
use crate::frame::FrameSource;
use crate::state::SharedState;
use crate::PixelRect;

pub use contour::{mask_contours, Contour};
pub use proximity::{MotionPermission, ProximityGuard, ProximityReading};
pub use trash::{select_candidate, TrashCandidate, TrashState, TrashTracker};
pub use zone::{overlap_holds, PresenceLatch, Zone, ZoneDebouncer, OVERLAP_RATIO};

/// Back-off after a failed frame read.
const FRAME_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Per-frame summary, mostly for logging and tests.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub detections: usize,
    pub capsules: usize,
    pub trash_candidates: usize,
    pub robot_contours: usize,
    pub human_contours: usize,
    /// Detections dropped for low confidence, bad geometry or missing masks.
    pub skipped: usize,
    pub proximity: ProximityReading,
}

pub struct PerceptionEngine {
    mapper: Arc<CoordinateMapper>,
    state: SharedState,
    trash_region: PixelRect,
    tracker: TrashTracker,
    guard: ProximityGuard,
    confidence: f32,
}

impl PerceptionEngine {
    pub fn new(
        mapper: Arc<CoordinateMapper>,
        state: SharedState,
        trash_region: PixelRect,
        tracker: TrashTracker,
        guard: ProximityGuard,
        confidence: f32,
    ) -> Self {
        Self {
            mapper,
            state,
            trash_region,
            tracker,
            guard,
            confidence,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Process one frame's detections, observed at `now`, for a frame of `frame_size` pixels.
    pub fn process(&self, detections: &[Detection], frame_size: (u32, u32), now: Instant) -> FrameReport {
        let mut skipped = 0usize;
        let mut capsule_boxes: Vec<PixelRect> = Vec::new();
        let mut candidates: Vec<TrashCandidate> = Vec::new();
        let mut robot: Vec<Contour> = Vec::new();
        let mut human: Vec<Contour> = Vec::new();

        for det in detections {
            if det.confidence < self.confidence || !det.bbox.is_finite() {
                skipped += 1;
                continue;
            }
            match &det.label {
                ObjectLabel::Capsule => capsule_boxes.push(det.bbox),
                ObjectLabel::CapsuleNotLabel => {
                    let latched = self.state.with_seal(|seal| {
                        let before = seal.flag;
                        (before, seal.update(&det.bbox))
                    });
                    if latched == (false, true) {
                        log::info!("seal check: capsule without seal detected");
                    }
                }
                ObjectLabel::Cup => {
                    let center = det.bbox.center();
                    if !self.trash_region.contains(&center) {
                        continue;
                    }
                    match self.mapper.project(center) {
                        Ok(world) => candidates.push(TrashCandidate {
                            pixel: center,
                            world,
                        }),
                        Err(err) => {
                            log::debug!("trash candidate dropped: {}", err);
                            skipped += 1;
                        }
                    }
                }
                ObjectLabel::Robot | ObjectLabel::Human => {
                    let Some(mask) = &det.mask else {
                        skipped += 1;
                        continue;
                    };
                    let contours = mask_contours(mask, frame_size.0, frame_size.1);
                    if contours.is_empty() {
                        skipped += 1;
                        continue;
                    }
                    if det.label == ObjectLabel::Robot {
                        robot.extend(contours);
                    } else {
                        human.extend(contours);
                    }
                }
                _ => {}
            }
        }

        if !capsule_boxes.is_empty() {
            self.state.with_zones(|zones| {
                for zone in zones.iter_mut() {
                    let holds = capsule_boxes
                        .iter()
                        .any(|bbox| overlap_holds(&zone.region, bbox));
                    ZoneDebouncer::observe(zone, holds, now);
                }
            });
        }

        if !candidates.is_empty() {
            self.state
                .with_trash(|trash| self.tracker.update(trash, &candidates, now));
        }

        let proximity = self
            .guard
            .evaluate(&robot, &human, self.state.manual_override());
        self.state
            .set_proximity(proximity.permission, proximity.distance);

        FrameReport {
            detections: detections.len(),
            capsules: capsule_boxes.len(),
            trash_candidates: candidates.len(),
            robot_contours: robot.len(),
            human_contours: human.len(),
            skipped,
            proximity,
        }
    }
}

/// Pull frames until `shutdown` is set.
///
/// Frame and detector errors are transient: logged, then the loop carries on.
pub fn run_perception_loop(
    source: &mut dyn FrameSource,
    detector: &mut dyn DetectorBackend,
    engine: &PerceptionEngine,
    shutdown: &AtomicBool,
) -> Result<()> {
    source.connect()?;
    detector.warm_up()?;
    log::info!("perception loop running with detector {}", detector.name());

    let mut consecutive_failures = 0u32;
    let mut last_health_log = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                consecutive_failures += 1;
                log::warn!(
                    "frame read failed ({} in a row): {}",
                    consecutive_failures,
                    err
                );
                std::thread::sleep(FRAME_RETRY_DELAY);
                continue;
            }
        };
        consecutive_failures = 0;
        if !frame.is_well_formed() {
            log::warn!(
                "frame {} malformed ({}x{}x{}, {} bytes), skipped",
                frame.sequence,
                frame.width,
                frame.height,
                frame.channels,
                frame.pixels().len()
            );
            continue;
        }

        let detections = match detector.detect(&frame, engine.confidence()) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!("detector failed on frame {}: {}", frame.sequence, err);
                continue;
            }
        };
        let report = engine.process(&detections, (frame.width, frame.height), frame.captured_at);
        log::debug!("frame {}: {:?}", frame.sequence, report);

        if last_health_log.elapsed() >= Duration::from_secs(60) {
            let stats = source.stats();
            log::info!(
                "perception: {} frames from {} (healthy: {})",
                stats.frames_captured,
                stats.url,
                source.is_healthy()
            );
            last_health_log = Instant::now();
        }
    }
    log::info!("perception loop stopped");
    Ok(())
}
