//! Observer types for store and connection updates.

use crate::types::{ConnectionState, Job};
use serde::{Deserialize, Serialize};

/// Configuration for an observer.
#[derive(Clone, Debug)]
pub struct ObserverConfig {
    /// Max buffered events before dropping the observer.
    /// Default: 256
    pub buffer_size: usize,

    /// Which events to deliver.
    pub filter: ObserverFilter,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: ObserverFilter::all(),
        }
    }
}

/// Filter criteria for observers.
#[derive(Clone, Debug, Default)]
pub struct ObserverFilter {
    /// Include job list events.
    pub include_jobs: bool,

    /// Include connection state events.
    pub include_connection: bool,
}

impl ObserverFilter {
    /// Job list updates only.
    pub fn jobs() -> Self {
        Self {
            include_jobs: true,
            ..Default::default()
        }
    }

    /// Connection state changes only.
    pub fn connection() -> Self {
        Self {
            include_connection: true,
            ..Default::default()
        }
    }

    pub fn all() -> Self {
        Self {
            include_jobs: true,
            include_connection: true,
        }
    }
}

/// Events delivered to observers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// The full current job list, sent after every merge or clear.
    Jobs { jobs: Vec<Job> },

    /// The streaming channel changed state.
    Connection {
        state: ConnectionState,
        attempt: u32,
    },

    /// Observer was removed.
    Dropped { reason: DropReason },
}

/// Why an observer was removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Event queue overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly removed.
    Unobserved,
    /// The sync client shut down.
    Shutdown,
}

/// Unique identifier for an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Handle to receive events for one observer.
pub struct ObserverHandle {
    pub id: ObserverId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<SyncEvent>,
}

impl ObserverHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SyncEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SyncEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SyncEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<SyncEvent> {
        self.receiver.try_iter().collect()
    }
}
