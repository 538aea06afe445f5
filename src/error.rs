//! Error types for job synchronization.

use crate::types::TargetId;
use thiserror::Error;

/// Main error type for sync operations.
///
/// Transport and decode failures inside a live subscription are handled
/// internally and surface only through `ConnectionState`; the variants here
/// are what callers can actually receive.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bootstrap fetch failed for {target}: {reason}")]
    Bootstrap { target: TargetId, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid subscription target: {0:?}")]
    InvalidTarget(String),

    #[error("Event loop is not running")]
    LoopClosed,
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Decode(e.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(e: toml::de::Error) -> Self {
        SyncError::Config(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
