//! Network collaborators: websocket channels and HTTP bootstrap.
//!
//! ```ignore
//! let config = SyncConfig::load("jobstream.toml")?;
//! let client = jobstream::net::spawn_client(config)?;
//!
//! let updates = client.observe(ObserverConfig::default());
//! client.subscribe("proj-1")?;
//! ```

mod http;
mod ws;

pub use http::HttpSnapshotSource;
pub use ws::WsTransport;

use crate::config::SyncConfig;
use crate::error::Result;
use crate::runtime::{EventLoop, EventLoopHandle};

/// Build the HTTP snapshot source and websocket transport for `config` and
/// start the sync loop on its own thread.
pub fn spawn_client(config: SyncConfig) -> Result<EventLoopHandle> {
    let source = HttpSnapshotSource::new(config.clone())?;
    let event_loop = EventLoop::from_config(&config, source, |sink| {
        WsTransport::new(config.clone(), sink)
    })?;
    event_loop.spawn()
}
