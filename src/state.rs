//! Cross-thread state shared by the perception and actuation loops.
//!
//! Each field group sits behind its own mutex and every critical section is
//! a short read or write. Perception writes through the `with_*` accessors;
//! actuation reads the flags and clears them once it has acted.
//!
//! Poisoned locks are recovered rather than reported: a panic on one side
//! must not take the other loop down with it.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::perception::proximity::{MotionPermission, DEFAULT_SENTINEL_DISTANCE};
use crate::perception::trash::{TrashCandidate, TrashState};
use crate::perception::zone::{PresenceLatch, Zone};
use crate::WorldPoint;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProximityState {
    pub permission: MotionPermission,
    pub distance: f64,
}

impl Default for ProximityState {
    fn default() -> Self {
        Self {
            permission: MotionPermission::Move,
            distance: DEFAULT_SENTINEL_DISTANCE,
        }
    }
}

/// Point-in-time copy of everything in `SharedState`.
#[derive(Clone, Debug, Serialize)]
pub struct StateSnapshot {
    pub zones: Vec<(String, bool)>,
    pub seal_absent: bool,
    pub trash_detected: bool,
    pub trash_target: Option<WorldPoint>,
    pub trash_last_point: Option<WorldPoint>,
    pub permission: MotionPermission,
    pub distance: f64,
    pub alive: bool,
    pub manual_override: bool,
}

struct Inner {
    zones: Mutex<Vec<Zone>>,
    seal: Mutex<PresenceLatch>,
    trash: Mutex<TrashState>,
    proximity: Mutex<ProximityState>,
    alive: AtomicBool,
    manual_override: AtomicBool,
}

/// Cheaply cloneable handle; all clones see the same state.
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SharedState {
    /// Build state for `zones`, kept in the given order. The arm starts alive.
    pub fn new(zones: Vec<Zone>, seal: PresenceLatch) -> Self {
        Self {
            inner: Arc::new(Inner {
                zones: Mutex::new(zones),
                seal: Mutex::new(seal),
                trash: Mutex::new(TrashState::default()),
                proximity: Mutex::new(ProximityState::default()),
                alive: AtomicBool::new(true),
                manual_override: AtomicBool::new(false),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Perception write path
    // ------------------------------------------------------------------------

    pub fn with_zones<R>(&self, f: impl FnOnce(&mut [Zone]) -> R) -> R {
        let mut zones = lock(&self.inner.zones);
        f(&mut zones)
    }

    pub fn with_trash<R>(&self, f: impl FnOnce(&mut TrashState) -> R) -> R {
        let mut trash = lock(&self.inner.trash);
        f(&mut trash)
    }

    pub fn with_seal<R>(&self, f: impl FnOnce(&mut PresenceLatch) -> R) -> R {
        let mut seal = lock(&self.inner.seal);
        f(&mut seal)
    }

    /// Force the seal-absent latch, as if the check region had seen a bare capsule.
    pub fn set_seal_absent(&self) {
        lock(&self.inner.seal).flag = true;
    }

    pub fn set_proximity(&self, permission: MotionPermission, distance: f64) {
        let mut proximity = lock(&self.inner.proximity);
        if proximity.permission != permission {
            log::info!("motion permission {:?} (distance {:.1})", permission, distance);
        }
        *proximity = ProximityState {
            permission,
            distance,
        };
    }

    // ------------------------------------------------------------------------
    // Zones
    // ------------------------------------------------------------------------

    pub fn zone_flag(&self, name: &str) -> Option<bool> {
        lock(&self.inner.zones)
            .iter()
            .find(|zone| zone.name == name)
            .map(|zone| zone.flag)
    }

    /// First latched zone, in configured order.
    pub fn active_zone(&self) -> Option<String> {
        lock(&self.inner.zones)
            .iter()
            .find(|zone| zone.flag)
            .map(|zone| zone.name.clone())
    }

    pub fn clear_zone(&self, name: &str) {
        if let Some(zone) = lock(&self.inner.zones)
            .iter_mut()
            .find(|zone| zone.name == name)
        {
            zone.clear();
        }
    }

    pub fn clear_zones(&self) {
        for zone in lock(&self.inner.zones).iter_mut() {
            zone.clear();
        }
    }

    // ------------------------------------------------------------------------
    // Seal
    // ------------------------------------------------------------------------

    pub fn seal_absent(&self) -> bool {
        lock(&self.inner.seal).flag
    }

    pub fn clear_seal(&self) {
        lock(&self.inner.seal).clear();
    }

    // ------------------------------------------------------------------------
    // Trash
    // ------------------------------------------------------------------------

    /// Stable trash target, if one is currently reported.
    pub fn trash_target(&self) -> Option<TrashCandidate> {
        let trash = lock(&self.inner.trash);
        if trash.detected {
            trash.target
        } else {
            None
        }
    }

    pub fn clear_trash(&self) {
        lock(&self.inner.trash).clear();
    }

    // ------------------------------------------------------------------------
    // Proximity
    // ------------------------------------------------------------------------

    pub fn motion_permission(&self) -> MotionPermission {
        lock(&self.inner.proximity).permission
    }

    pub fn last_distance(&self) -> f64 {
        lock(&self.inner.proximity).distance
    }

    pub fn manual_override(&self) -> bool {
        self.inner.manual_override.load(Ordering::SeqCst)
    }

    pub fn set_manual_override(&self, enabled: bool) {
        self.inner.manual_override.store(enabled, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------------
    // Liveness
    // ------------------------------------------------------------------------

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// One-way: once dead the arm stays dead for the rest of the process.
    pub fn mark_dead(&self, reason: &str) {
        if self.inner.alive.swap(false, Ordering::SeqCst) {
            log::error!("actuator marked dead: {}", reason);
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let zones = lock(&self.inner.zones)
            .iter()
            .map(|zone| (zone.name.clone(), zone.flag))
            .collect();
        let seal_absent = lock(&self.inner.seal).flag;
        let (trash_detected, trash_target, trash_last_point) = {
            let trash = lock(&self.inner.trash);
            (trash.detected, trash.target.map(|t| t.world), trash.last_point)
        };
        let proximity = *lock(&self.inner.proximity);
        StateSnapshot {
            zones,
            seal_absent,
            trash_detected,
            trash_target,
            trash_last_point,
            permission: proximity.permission,
            distance: proximity.distance,
            alive: self.is_alive(),
            manual_override: self.manual_override(),
        }
    }
}
