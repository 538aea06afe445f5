//! # Job Stream
//!
//! Keeps a client's view of long-running remote jobs (generation, upscaling,
//! multi-view rendering) in sync with the server, across network loss and
//! server restarts.
//!
//! ## Core Concepts
//!
//! - **Store**: Local authoritative map from job id to latest record
//! - **Bootstrap**: One snapshot fetch when a subscription starts
//! - **Stream**: A push channel with explicit reconnect states and backoff
//! - **Observers**: Consumers receive full job lists and connection changes
//!
//! ## Example
//!
//! ```ignore
//! use jobstream::{EventLoop, ObserverConfig, SyncConfig, SyncEvent};
//!
//! let config = SyncConfig::load("jobstream.toml")?;
//! let client = EventLoop::from_config(&config, my_source, |sink| MyTransport::new(sink))?
//!     .spawn()?;
//!
//! let updates = client.observe(ObserverConfig::default());
//! client.subscribe("proj-1")?;
//!
//! while let Ok(event) = updates.recv() {
//!     if let SyncEvent::Jobs { jobs } = event {
//!         println!("{} jobs", jobs.len());
//!     }
//! }
//! ```

pub mod config;
pub mod error;
#[cfg(feature = "net")]
pub mod net;
pub mod observers;
pub mod policy;
pub mod router;
pub mod runtime;
pub mod store;
pub mod stream;
pub mod subscription;
pub mod types;

// Re-exports
pub use config::{ReconnectConfig, SyncConfig};
pub use error::{Result, SyncError};
pub use observers::{
    DropReason, ObserverConfig, ObserverFilter, ObserverHandle, ObserverId, ObserverSet,
    SyncEvent,
};
pub use policy::ReconnectPolicy;
pub use router::{decode_job, decode_snapshot, EventRouter, RouterStats};
pub use runtime::{event_queue, EventLoop, EventLoopHandle, EventSink, LoopEvent};
pub use store::{JobStore, MergeOutcome, MergePolicy};
pub use stream::{Clock, ManualClock, StreamClient, SystemClock, Transport};
pub use subscription::{
    BootstrapTicket, ManagerOptions, SnapshotSource, SubscribeStep, SubscriptionManager,
};
pub use types::*;
