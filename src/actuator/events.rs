//! Asynchronous arm event delivery.
//!
//! Drivers publish `ArmEvent`s into an `EventBus`; a dedicated delivery thread
//! fans them out to subscribers so callbacks never run on the control loops.
//! `subscribe` hands back a `Subscription`; dropping or cancelling it
//! unregisters the callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArmEvent {
    ErrorChanged { error_code: i32, warn_code: i32 },
    StateChanged { state: i32 },
    CountChanged { count: u64 },
}

type Callback = Arc<dyn Fn(&ArmEvent) + Send + Sync>;
type Subscribers = Mutex<Vec<(u64, Callback)>>;

fn lock(subscribers: &Subscribers) -> MutexGuard<'_, Vec<(u64, Callback)>> {
    match subscribers.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: Sender<ArmEvent>,
    subscribers: Arc<Subscribers>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus and start its delivery thread. The thread exits once every
    /// clone of the bus has been dropped.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<ArmEvent>();
        let subscribers: Arc<Subscribers> = Arc::new(Mutex::new(Vec::new()));
        let delivery = Arc::downgrade(&subscribers);
        std::thread::Builder::new()
            .name("arm-events".to_string())
            .spawn(move || {
                for event in rx {
                    let Some(subscribers) = delivery.upgrade() else {
                        break;
                    };
                    let callbacks: Vec<Callback> =
                        lock(&subscribers).iter().map(|(_, cb)| cb.clone()).collect();
                    for callback in callbacks {
                        callback(&event);
                    }
                }
            })
            .map(|_| ())
            .unwrap_or_else(|err| log::error!("failed to start arm event thread: {}", err));
        Self {
            tx,
            subscribers,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn publish(&self, event: ArmEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("arm event dropped: delivery thread gone");
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&ArmEvent) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.subscribers).push((id, Arc::new(callback)));
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation handle for one subscription.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            lock(&subscribers).retain(|(id, _)| *id != self.id);
        }
    }
}
