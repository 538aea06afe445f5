//! Decodes inbound channel payloads and merges them into the store.
//!
//! Malformed payloads are logged and dropped here; they never count as a
//! connection failure.

use crate::error::{Result, SyncError};
use crate::store::{JobStore, MergeOutcome};
use crate::types::Job;
use tracing::warn;

/// Counters for routed payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Payloads decoded and merged (including merges the policy ignored).
    pub routed: u64,
    /// Payloads that failed to decode.
    pub dropped: u64,
}

/// Routes serialized job records into a `JobStore`.
#[derive(Debug, Default)]
pub struct EventRouter {
    stats: RouterStats,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one payload and merge it. Returns `None` if it was dropped.
    pub fn on_message(&mut self, raw: &str, store: &mut JobStore) -> Option<MergeOutcome> {
        match decode_job(raw) {
            Ok(job) => {
                self.stats.routed += 1;
                Some(store.merge(job))
            }
            Err(e) => {
                self.stats.dropped += 1;
                warn!(error = %e, payload_len = raw.len(), "dropping malformed job payload");
                None
            }
        }
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }
}

/// Decode and validate one serialized job record.
pub fn decode_job(raw: &str) -> Result<Job> {
    let job: Job = serde_json::from_str(raw)?;
    job.validate().map_err(SyncError::Decode)?;
    Ok(job)
}

/// Decode a bootstrap snapshot: either a bare array of records or an object
/// with a `jobs` array.
pub fn decode_snapshot(raw: &str) -> Result<Vec<Job>> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum Snapshot {
        List(Vec<Job>),
        Wrapped { jobs: Vec<Job> },
    }

    let jobs = match serde_json::from_str::<Snapshot>(raw)? {
        Snapshot::List(jobs) | Snapshot::Wrapped { jobs } => jobs,
    };
    for job in &jobs {
        job.validate().map_err(SyncError::Decode)?;
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobId, JobStatus};

    #[test]
    fn test_routes_valid_payload() {
        let mut router = EventRouter::new();
        let mut store = JobStore::new();

        let outcome = router.on_message(
            r#"{"id":"j1","type":"generation","status":"running","progress":40}"#,
            &mut store,
        );

        assert_eq!(outcome, Some(MergeOutcome::Inserted));
        assert_eq!(store.get(&JobId::new("j1")).unwrap().progress, 40);
        assert_eq!(router.stats(), RouterStats { routed: 1, dropped: 0 });
    }

    #[test]
    fn test_drops_malformed_payloads() {
        let mut router = EventRouter::new();
        let mut store = JobStore::new();

        let bad = [
            "not json",
            r#"{"id":"j1"}"#,
            r#"{"id":"j1","type":"sketch","status":"queued"}"#,
            r#"{"id":"j1","type":"refine","status":"queued","progress":250}"#,
            r#"{"id":"j1","type":"refine","status":"queued","progress":101}"#,
            r#"{"id":"","type":"refine","status":"queued"}"#,
        ];
        for payload in bad {
            assert_eq!(router.on_message(payload, &mut store), None, "{payload}");
        }

        assert!(store.is_empty());
        assert_eq!(router.stats().dropped, bad.len() as u64);
    }

    #[test]
    fn test_preserves_delivery_order() {
        let mut router = EventRouter::new();
        let mut store = JobStore::new();

        for progress in [10, 20, 30] {
            let raw = format!(
                r#"{{"id":"j1","type":"upscale","status":"running","progress":{progress}}}"#
            );
            router.on_message(&raw, &mut store);
        }

        assert_eq!(store.get(&JobId::new("j1")).unwrap().progress, 30);
    }

    #[test]
    fn test_decode_snapshot_shapes() {
        let bare = r#"[{"id":"a","type":"generation","status":"queued"}]"#;
        let wrapped = r#"{"jobs":[{"id":"a","type":"generation","status":"completed","progress":100,"result":"img/a.png"}]}"#;

        assert_eq!(decode_snapshot(bare).unwrap().len(), 1);
        let jobs = decode_snapshot(wrapped).unwrap();
        assert_eq!(jobs[0].status, JobStatus::Completed);
        assert_eq!(jobs[0].result.as_deref(), Some("img/a.png"));

        assert!(decode_snapshot(r#"{"items":[]}"#).is_err());
        assert!(matches!(
            decode_snapshot(r#"[{"id":"a","type":"generation","status":"queued","progress":120}]"#),
            Err(SyncError::Decode(_))
        ));
    }
}
