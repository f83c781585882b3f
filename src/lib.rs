//! Aris workcell controller
//!
//! This crate couples a vision detection stream with the task sequencing of a
//! robotic arm serving capsule ice cream.
//!
//! # Architecture
//!
//! Two loops run side by side and only meet in two places:
//!
//! 1. **Perception** (`perception`): frame → detector → zone latches, trash
//!    target tracking and the proximity safety gate. Results land in `SharedState`.
//! 2. **Actuation** (`task`): commands from the `channel` drive the task state
//!    machine, which reads `SharedState` and calls the arm through `actuator`.
//!
//! # Module Structure
//!
//! - `calibration`: pixel → world homography (fit once, immutable)
//! - `frame`, `ingest`: frames and frame sources
//! - `detect`: detector collaborator interface and detection types
//! - `perception`: zone debouncing, trash tracking, proximity guard
//! - `state`: cross-thread shared state
//! - `actuator`: arm driver interface, fault events, simulated arm
//! - `channel`: line protocol and the single-client command channel
//! - `task`: actuation phases and the task state machine
//! - `config`: file + environment configuration
//! - Core types: pixel/world points and rectangles

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub mod actuator;
pub mod calibration;
pub mod channel;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod perception;
pub mod state;
pub mod task;

pub use actuator::{ActuatorDriver, ActuatorFault, Arm, SimulatedArm};
pub use calibration::{CalibrationSet, CoordinateMapper};
pub use channel::{ChannelHandle, ChannelState, Command, CommandChannel, Notification};
pub use config::ControllerConfig;
pub use detect::{Detection, DetectorBackend, ObjectLabel};
pub use frame::{Frame, FrameSource};
pub use perception::{MotionPermission, PerceptionEngine};
pub use state::SharedState;
pub use task::{ActuationPhase, TaskConfig, TaskExit, TaskStateMachine};

// ----------------------------------------------------------------------------
// Geometry
// ----------------------------------------------------------------------------

/// A point in image space (pixels).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &PixelPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A point on the work surface, in arm base coordinates (mm).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
}

impl WorldPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &WorldPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned rectangle in pixel space, corners `(x1, y1)` to `(x2, y2)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl PixelRect {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from an origin plus extent, the way region-of-interest tables are written.
    pub fn from_xywh(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.area() <= 0.0
    }

    pub fn intersection_area(&self, other: &PixelRect) -> f64 {
        let w = self.x2.min(other.x2) - self.x1.max(other.x1);
        let h = self.y2.min(other.y2) - self.y1.max(other.y1);
        if w <= 0.0 || h <= 0.0 {
            return 0.0;
        }
        w * h
    }

    pub fn center(&self) -> PixelPoint {
        PixelPoint::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Inclusive containment.
    pub fn contains(&self, point: &PixelPoint) -> bool {
        self.x1 <= point.x && point.x <= self.x2 && self.y1 <= point.y && point.y <= self.y2
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }
}

/// Validate a zone name used in configuration and logs.
pub fn validate_zone_name(name: &str) -> Result<()> {
    // Compile once for hot paths.
    static ZONE_NAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = ZONE_NAME_RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9_-]{1,32}$").unwrap());

    if !re.is_match(name) {
        return Err(anyhow!(
            "zone name '{}' must match ^[A-Za-z0-9_-]{{1,32}}$",
            name
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_intersection_and_area() {
        let zone = PixelRect::from_xywh(455.0, 65.0, 95.0, 95.0);
        assert_eq!(zone.area(), 95.0 * 95.0);

        let inside = PixelRect::new(460.0, 70.0, 500.0, 110.0);
        assert_eq!(zone.intersection_area(&inside), inside.area());

        let outside = PixelRect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(zone.intersection_area(&outside), 0.0);

        let touching = PixelRect::new(550.0, 65.0, 600.0, 100.0);
        assert_eq!(zone.intersection_area(&touching), 0.0);
    }

    #[test]
    fn inverted_rect_has_no_area() {
        let rect = PixelRect::new(10.0, 10.0, 5.0, 20.0);
        assert_eq!(rect.area(), 0.0);
        assert!(rect.is_empty());
    }

    #[test]
    fn contains_includes_edges() {
        let region = PixelRect::new(100.0, 20.0, 520.0, 210.0);
        assert!(region.contains(&PixelPoint::new(300.0, 100.0)));
        assert!(region.contains(&PixelPoint::new(100.0, 100.0)));
        assert!(region.contains(&PixelPoint::new(300.0, 210.0)));
        assert!(!region.contains(&PixelPoint::new(99.9, 100.0)));
    }

    #[test]
    fn zone_names_are_validated() {
        assert!(validate_zone_name("A").is_ok());
        assert!(validate_zone_name("slot_2-left").is_ok());
        assert!(validate_zone_name("").is_err());
        assert!(validate_zone_name("zone a").is_err());
        assert!(validate_zone_name(&"x".repeat(33)).is_err());
    }
}
