//! Proximity safety gate between the arm and people.
//!
//! Advisory only: the guard publishes `MotionPermission` into shared state and
//! the arm wrapper polls it before issuing the next motion.

use serde::Serialize;

use crate::perception::contour::Contour;

pub const DEFAULT_STOP_DISTANCE: f64 = 50.0;
/// Reported distance when either side has nothing to measure.
pub const DEFAULT_SENTINEL_DISTANCE: f64 = 300.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionPermission {
    #[default]
    Move,
    Hold,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProximityReading {
    pub distance: f64,
    pub permission: MotionPermission,
}

#[derive(Clone, Copy, Debug)]
pub struct ProximityGuard {
    pub stop_distance: f64,
    pub sentinel_distance: f64,
}

impl Default for ProximityGuard {
    fn default() -> Self {
        Self {
            stop_distance: DEFAULT_STOP_DISTANCE,
            sentinel_distance: DEFAULT_SENTINEL_DISTANCE,
        }
    }
}

impl ProximityGuard {
    pub fn new(stop_distance: f64, sentinel_distance: f64) -> Self {
        Self {
            stop_distance,
            sentinel_distance,
        }
    }

    /// Evaluate one frame's contours.
    ///
    /// `manual_override` (an operator is deliberately working next to the arm)
    /// always yields `Move`.
    pub fn evaluate(
        &self,
        actuator: &[Contour],
        obstacle: &[Contour],
        manual_override: bool,
    ) -> ProximityReading {
        let Some(distance) = min_distance(actuator, obstacle) else {
            return ProximityReading {
                distance: self.sentinel_distance,
                permission: MotionPermission::Move,
            };
        };
        let permission = if distance <= self.stop_distance && !manual_override {
            MotionPermission::Hold
        } else {
            MotionPermission::Move
        };
        ProximityReading {
            distance,
            permission,
        }
    }
}

/// Brute-force minimum distance over every point pair, `None` when either side is empty.
pub fn min_distance(a: &[Contour], b: &[Contour]) -> Option<f64> {
    let mut best: Option<f64> = None;
    for pa in a.iter().flatten() {
        for pb in b.iter().flatten() {
            let d = pa.distance_to(pb);
            if best.map_or(true, |current| d < current) {
                best = Some(d);
            }
        }
    }
    best
}
