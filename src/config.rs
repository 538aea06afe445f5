//! Client configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! base_url = "https://jobs.example.com"
//! retain_on_unsubscribe = true
//!
//! [reconnect]
//! base_delay_ms = 500
//! max_attempts = 5
//! ```

use crate::error::{Result, SyncError};
use crate::store::MergePolicy;
use crate::types::TargetId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Placeholder replaced by the subscription target in endpoint paths.
pub const TARGET_PLACEHOLDER: &str = "{target}";

/// Backoff settings, mapped onto `ReconnectPolicy`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect. Default: 1000ms
    pub base_delay_ms: u64,

    /// Ceiling for any single delay. Default: 30000ms
    pub max_delay_ms: u64,

    /// Attempts before giving up. Default: 10
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            max_attempts: 10,
        }
    }
}

/// Top-level client configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// HTTP base URL of the job service.
    pub base_url: String,

    /// Snapshot endpoint path, relative to `base_url`.
    pub snapshot_path: String,

    /// Streaming endpoint path, relative to the websocket form of `base_url`.
    pub stream_path: String,

    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,

    /// Timeout for the bootstrap request. Default: 10000ms
    pub request_timeout_ms: u64,

    /// Max queued events per observer before it is dropped. Default: 256
    pub observer_buffer: usize,

    /// Keep jobs in the store after unsubscribing.
    pub retain_on_unsubscribe: bool,

    /// How inbound records replace stored ones.
    pub merge_policy: MergePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            snapshot_path: "/api/sessions/{target}/jobs".to_string(),
            stream_path: "/ws/sessions/{target}/jobs".to_string(),
            reconnect: ReconnectConfig::default(),
            request_timeout_ms: 10000,
            observer_buffer: 256,
            retain_on_unsubscribe: false,
            merge_policy: MergePolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reconnect.base_delay_ms == 0 {
            return Err(SyncError::Config("reconnect.base_delay_ms must be > 0".into()));
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(SyncError::Config(format!(
                "reconnect.max_delay_ms ({}) is below base_delay_ms ({})",
                self.reconnect.max_delay_ms, self.reconnect.base_delay_ms
            )));
        }
        if self.observer_buffer == 0 {
            return Err(SyncError::Config("observer_buffer must be > 0".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(SyncError::Config(format!(
                "base_url must be http(s): {}",
                self.base_url
            )));
        }
        for (name, path) in [
            ("snapshot_path", &self.snapshot_path),
            ("stream_path", &self.stream_path),
        ] {
            if !path.contains(TARGET_PLACEHOLDER) {
                return Err(SyncError::Config(format!(
                    "{name} must contain {TARGET_PLACEHOLDER}: {path}"
                )));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Full bootstrap URL for a target.
    pub fn snapshot_url(&self, target: &TargetId) -> Result<String> {
        let path = fill_target(&self.snapshot_path, target)?;
        Ok(format!("{}{}", self.base_url.trim_end_matches('/'), path))
    }

    /// Full websocket URL for a target (`http` → `ws`, `https` → `wss`).
    pub fn stream_url(&self, target: &TargetId) -> Result<String> {
        let path = fill_target(&self.stream_path, target)?;
        let base = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        Ok(format!("{ws_base}{path}"))
    }
}

fn fill_target(template: &str, target: &TargetId) -> Result<String> {
    if !target.is_valid() {
        return Err(SyncError::InvalidTarget(target.0.clone()));
    }
    Ok(template.replace(TARGET_PLACEHOLDER, target.as_str()))
}
