//! Bootstrap snapshots over HTTP.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::router::decode_snapshot;
use crate::subscription::SnapshotSource;
use crate::types::{Job, TargetId};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use tracing::debug;

/// Fetches `GET {base_url}{snapshot_path}` and decodes the job list.
#[derive(Clone)]
pub struct HttpSnapshotSource {
    client: Client,
    config: SyncConfig,
}

impl HttpSnapshotSource {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

impl SnapshotSource for HttpSnapshotSource {
    fn fetch(&self, target: &TargetId) -> Result<Vec<Job>> {
        let url = self.config.snapshot_url(target)?;
        let fail = |reason: String| SyncError::Bootstrap {
            target: target.clone(),
            reason,
        };

        debug!(target = %target, url = %url, "fetching job snapshot");
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {status}")));
        }

        let body = response.text().map_err(|e| fail(e.to_string()))?;
        decode_snapshot(&body).map_err(|e| fail(e.to_string()))
    }
}
