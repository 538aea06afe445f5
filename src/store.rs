//! Local authoritative job store.

use crate::observers::ObserverSet;
use crate::types::{Job, JobId, JobStatus, StatusCounts};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// How an inbound record replaces a stored one with the same id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Replace unconditionally, in arrival order.
    #[default]
    LastWriteWins,
    /// Ignore records that would move a job backwards in its lifecycle,
    /// and any update to a job that already finished.
    MonotonicStatus,
}

/// Result of a merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    Ignored,
}

impl MergeOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, MergeOutcome::Ignored)
    }
}

/// In-memory mapping from job id to the latest known record.
///
/// All mutation happens on the sync loop, so the store itself holds no lock.
/// Observers are notified synchronously after every change.
pub struct JobStore {
    jobs: HashMap<JobId, Job>,
    policy: MergePolicy,
    observers: Arc<ObserverSet>,
}

impl JobStore {
    /// Create an empty store with its own observer set.
    pub fn new() -> Self {
        Self::with_observers(Arc::new(ObserverSet::new()), MergePolicy::default())
    }

    /// Create an empty store publishing through a shared observer set.
    pub fn with_observers(observers: Arc<ObserverSet>, policy: MergePolicy) -> Self {
        Self {
            jobs: HashMap::new(),
            policy,
            observers,
        }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    pub fn observers(&self) -> &Arc<ObserverSet> {
        &self.observers
    }

    /// Insert the record, or replace the stored record with the same id.
    pub fn merge(&mut self, job: Job) -> MergeOutcome {
        let outcome = self.merge_quiet(job);
        if outcome.changed() {
            self.notify();
        }
        outcome
    }

    /// Replace the whole contents with a snapshot. Observers get one
    /// notification for the batch rather than one per record.
    pub fn replace_all(&mut self, snapshot: Vec<Job>) -> usize {
        self.jobs.clear();
        let mut merged = 0;
        for job in snapshot {
            if self.merge_quiet(job).changed() {
                merged += 1;
            }
        }
        self.notify();
        merged
    }

    /// Remove every job.
    pub fn clear(&mut self) {
        if self.jobs.is_empty() {
            return;
        }
        self.jobs.clear();
        self.notify();
    }

    /// Current jobs in no particular order. Calling again restarts iteration.
    pub fn list(&self) -> impl Iterator<Item = &Job> + '_ {
        self.jobs.values()
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs ordered newest first; jobs without a timestamp sort last.
    pub fn recent_first(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by(|a, b| match (&a.created_at, &b.created_at) {
            (Some(x), Some(y)) => y.cmp(x).then_with(|| a.id.cmp(&b.id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        jobs
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    fn merge_quiet(&mut self, job: Job) -> MergeOutcome {
        match self.jobs.get_mut(&job.id) {
            None => {
                self.jobs.insert(job.id.clone(), job);
                MergeOutcome::Inserted
            }
            Some(existing) => {
                if self.policy == MergePolicy::MonotonicStatus && regresses(existing, &job) {
                    debug!(
                        job = %job.id,
                        stored = ?existing.status,
                        incoming = ?job.status,
                        "ignoring out-of-order job update"
                    );
                    return MergeOutcome::Ignored;
                }
                *existing = job;
                MergeOutcome::Replaced
            }
        }
    }

    fn notify(&self) {
        // Skip the clone when nobody is listening.
        if self.observers.wants_jobs() {
            self.observers.publish_jobs(self.jobs.values().cloned().collect());
        }
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn regresses(stored: &Job, incoming: &Job) -> bool {
    stored.status.is_terminal() || incoming.status.rank() < stored.status.rank()
}
