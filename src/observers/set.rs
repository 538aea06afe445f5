//! Observer registry that fans events out to bounded queues.

use crate::types::{ConnectionState, Job};
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::types::{DropReason, ObserverConfig, ObserverHandle, ObserverId, SyncEvent};

/// Internal observer state.
struct Observer {
    config: ObserverConfig,
    sender: Sender<SyncEvent>,
}

enum SendOutcome {
    Sent,
    Full,
    Gone,
}

impl Observer {
    fn try_send(&self, event: SyncEvent) -> SendOutcome {
        match self.sender.try_send(event) {
            Ok(()) => SendOutcome::Sent,
            Err(crossbeam_channel::TrySendError::Full(_)) => SendOutcome::Full,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => SendOutcome::Gone,
        }
    }

    fn wants(&self, event: &SyncEvent) -> bool {
        match event {
            SyncEvent::Jobs { .. } => self.config.filter.include_jobs,
            SyncEvent::Connection { .. } => self.config.filter.include_connection,
            SyncEvent::Dropped { .. } => true,
        }
    }
}

/// Shared set of observers.
///
/// Both the job store and the stream client publish through the same set, so
/// a consumer sees job lists and connection changes on one queue in the order
/// they happened. Registration may happen from any thread.
pub struct ObserverSet {
    observers: RwLock<HashMap<ObserverId, Observer>>,
    next_id: AtomicU64,
    default_buffer: usize,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::with_buffer_size(ObserverConfig::default().buffer_size)
    }

    /// Create a set whose `observe_default` queues hold `buffer_size` events.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            default_buffer: buffer_size.max(1),
        }
    }

    /// Register an observer.
    pub fn observe(&self, config: ObserverConfig) -> ObserverHandle {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.observers
            .write()
            .insert(id, Observer { config, sender });

        ObserverHandle { id, receiver }
    }

    /// Register an observer for all events with the configured buffer size.
    pub fn observe_default(&self) -> ObserverHandle {
        self.observe(ObserverConfig {
            buffer_size: self.default_buffer,
            ..Default::default()
        })
    }

    /// Remove an observer.
    pub fn unobserve(&self, id: ObserverId) {
        if let Some(observer) = self.observers.write().remove(&id) {
            let _ = observer.sender.try_send(SyncEvent::Dropped {
                reason: DropReason::Unobserved,
            });
        }
    }

    /// Remove every observer, telling each why.
    pub fn close_all(&self, reason: DropReason) {
        let drained: Vec<Observer> = self.observers.write().drain().map(|(_, o)| o).collect();
        for observer in drained {
            let _ = observer.sender.try_send(SyncEvent::Dropped {
                reason: reason.clone(),
            });
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Publish the full job list.
    pub fn publish_jobs(&self, jobs: Vec<Job>) {
        self.broadcast(SyncEvent::Jobs { jobs });
    }

    /// Publish a connection state change.
    pub fn publish_connection(&self, state: ConnectionState, attempt: u32) {
        self.broadcast(SyncEvent::Connection { state, attempt });
    }

    /// True if some observer would receive job list events.
    pub fn wants_jobs(&self) -> bool {
        self.observers
            .read()
            .values()
            .any(|o| o.config.filter.include_jobs)
    }

    /// Deliver to matching observers. Drops observers that cannot receive.
    fn broadcast(&self, event: SyncEvent) {
        let mut overflowed = Vec::new();
        let mut gone = Vec::new();

        {
            let observers = self.observers.read();
            for (id, observer) in observers.iter() {
                if !observer.wants(&event) {
                    continue;
                }
                match observer.try_send(event.clone()) {
                    SendOutcome::Sent => {}
                    SendOutcome::Full => overflowed.push(*id),
                    SendOutcome::Gone => gone.push(*id),
                }
            }
        }

        if overflowed.is_empty() && gone.is_empty() {
            return;
        }

        let mut observers = self.observers.write();
        for id in gone {
            observers.remove(&id);
        }
        for id in overflowed {
            if let Some(observer) = observers.remove(&id) {
                debug!(observer = id.0, "dropping slow observer");
                // Queue is full, so this usually fails. That's ok.
                let _ = observer.sender.try_send(SyncEvent::Dropped {
                    reason: DropReason::BufferOverflow,
                });
            }
        }
    }
}

impl Default for ObserverSet {
    fn default() -> Self {
        Self::new()
    }
}
