//! Trash target selection and stability filtering.
//!
//! Cups left in the trash region are candidates. The one lowest in the image
//! (largest pixel y, closest to the arm under the ground-plane assumption) is
//! selected each frame; it must hold still before it is reported.

use std::time::{Duration, Instant};

use crate::{PixelPoint, WorldPoint};

pub const DEFAULT_STABILITY_RADIUS: f64 = 10.0;
pub const DEFAULT_STABILITY_WINDOW: Duration = Duration::from_secs(1);

/// One qualifying cup in one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrashCandidate {
    pub pixel: PixelPoint,
    pub world: WorldPoint,
}

/// Tracker state kept in `SharedState`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrashState {
    /// Stable target present.
    pub detected: bool,
    /// Candidate selected on the most recent frame with candidates.
    pub target: Option<TrashCandidate>,
    /// World point selected on the previous update.
    pub last_point: Option<WorldPoint>,
    pub stable_since: Option<Instant>,
}

impl TrashState {
    /// External un-latch after a pickup attempt. The next report needs a fresh window.
    pub fn clear(&mut self) {
        self.detected = false;
        self.stable_since = None;
    }
}

/// Pick the candidate with strictly maximal pixel y; ties keep the earliest.
pub fn select_candidate(candidates: &[TrashCandidate]) -> Option<TrashCandidate> {
    let mut best: Option<TrashCandidate> = None;
    for candidate in candidates {
        match best {
            Some(current) if candidate.pixel.y <= current.pixel.y => {}
            _ => best = Some(*candidate),
        }
    }
    best
}

#[derive(Clone, Copy, Debug)]
pub struct TrashTracker {
    pub stability_radius: f64,
    pub stability_window: Duration,
}

impl Default for TrashTracker {
    fn default() -> Self {
        Self {
            stability_radius: DEFAULT_STABILITY_RADIUS,
            stability_window: DEFAULT_STABILITY_WINDOW,
        }
    }
}

impl TrashTracker {
    pub fn new(stability_radius: f64, stability_window: Duration) -> Self {
        Self {
            stability_radius,
            stability_window,
        }
    }

    /// Run one frame. Frames without candidates leave the state untouched.
    pub fn update(&self, state: &mut TrashState, candidates: &[TrashCandidate], now: Instant) -> bool {
        let Some(selected) = select_candidate(candidates) else {
            return state.detected;
        };
        state.target = Some(selected);

        if let Some(previous) = state.last_point {
            if selected.world.distance_to(&previous) < self.stability_radius {
                match state.stable_since {
                    None => state.stable_since = Some(now),
                    Some(start) => {
                        if !state.detected
                            && now.saturating_duration_since(start) >= self.stability_window
                        {
                            state.detected = true;
                            log::info!(
                                "trash target stable at ({}, {})",
                                selected.world.x,
                                selected.world.y
                            );
                        }
                    }
                }
            } else {
                if state.detected {
                    log::debug!("trash target moved, clearing");
                }
                state.stable_since = None;
                state.detected = false;
            }
        }
        state.last_point = Some(selected.world);
        state.detected
    }
}
