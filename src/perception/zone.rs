//! Zone debouncing.
//!
//! A zone flag is a sticky latch: the debouncer only ever sets it. The task
//! state machine clears it once the slot it guards has been serviced.

use std::time::{Duration, Instant};

use crate::PixelRect;

/// Fraction of a detection box that must fall inside a region.
pub const OVERLAP_RATIO: f64 = 0.8;

/// A named slot in image space with its debounce state.
#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    pub name: String,
    pub region: PixelRect,
    pub dwell: Duration,
    pub flag: bool,
    pub pending_start: Option<Instant>,
}

impl Zone {
    pub fn new(name: impl Into<String>, region: PixelRect, dwell: Duration) -> Self {
        Self {
            name: name.into(),
            region,
            dwell,
            flag: false,
            pending_start: None,
        }
    }

    /// External un-latch, after the consumer has acted on the slot.
    pub fn clear(&mut self) {
        self.flag = false;
        self.pending_start = None;
    }
}

/// True when at least 80% of `bbox` lies inside `region`.
///
/// Zero-area boxes never qualify.
pub fn overlap_holds(region: &PixelRect, bbox: &PixelRect) -> bool {
    let area = bbox.area();
    if area <= 0.0 || !bbox.is_finite() {
        return false;
    }
    region.intersection_area(bbox) >= OVERLAP_RATIO * area
}

/// Dwell-based debouncer for slot zones.
pub struct ZoneDebouncer;

impl ZoneDebouncer {
    /// Feed one detection box observed at `now`.
    pub fn update(zone: &mut Zone, bbox: &PixelRect, now: Instant) -> (bool, Option<Instant>) {
        let holds = overlap_holds(&zone.region, bbox);
        Self::observe(zone, holds, now)
    }

    /// Feed a precomputed overlap outcome observed at `now`.
    ///
    /// A failing observation clears the pending start; it never clears the flag.
    pub fn observe(zone: &mut Zone, holds: bool, now: Instant) -> (bool, Option<Instant>) {
        if !holds {
            zone.pending_start = None;
            return (zone.flag, zone.pending_start);
        }
        if zone.flag {
            zone.pending_start = Some(now);
            return (zone.flag, zone.pending_start);
        }
        match zone.pending_start {
            None => zone.pending_start = Some(now),
            Some(start) => {
                if now.saturating_duration_since(start) >= zone.dwell {
                    zone.flag = true;
                    log::info!("zone {} latched", zone.name);
                }
            }
        }
        (zone.flag, zone.pending_start)
    }
}

/// Single-shot presence latch: set the first time a box overlaps the region.
#[derive(Clone, Debug, PartialEq)]
pub struct PresenceLatch {
    pub region: PixelRect,
    pub flag: bool,
}

impl PresenceLatch {
    pub fn new(region: PixelRect) -> Self {
        Self {
            region,
            flag: false,
        }
    }

    pub fn update(&mut self, bbox: &PixelRect) -> bool {
        if !self.flag && overlap_holds(&self.region, bbox) {
            self.flag = true;
        }
        self.flag
    }

    pub fn clear(&mut self) {
        self.flag = false;
    }
}
