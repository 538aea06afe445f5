//! Observers for live job and connection updates.
//!
//! Consumers (progress views, status badges) register an observer and receive
//! events on a bounded queue:
//! - Full job lists after every store change
//! - Connection state transitions
//!
//! An observer that falls behind is dropped instead of blocking the sync loop.
//!
//! # Example
//!
//! ```ignore
//! let handle = observers.observe(ObserverConfig::default());
//!
//! loop {
//!     match handle.recv() {
//!         Ok(SyncEvent::Jobs { jobs }) => render(&jobs),
//!         Ok(SyncEvent::Connection { state, .. }) => show_badge(state),
//!         Ok(SyncEvent::Dropped { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod set;
mod types;

pub use set::ObserverSet;
pub use types::{
    DropReason, ObserverConfig, ObserverFilter, ObserverHandle, ObserverId, SyncEvent,
};
