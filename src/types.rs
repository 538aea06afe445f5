//! Core types for job synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque job identifier, stable for the job's lifetime.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        JobId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription target (a session) whose jobs are tracked.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        TargetId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the id is non-empty and safe to embed in a URL path.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    }
}

impl fmt::Debug for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetId({})", self.0)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        TargetId(s.to_string())
    }
}

/// Kind of remote work a job performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    Generation,
    Upscale,
    Refine,
    MultiAngle,
}

/// Lifecycle status of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs receive no further updates.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Position in the lifecycle. Both terminal states share the top rank.
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }
}

/// One unit of remote asynchronous work, as reported by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,

    #[serde(rename = "type")]
    pub job_type: JobType,

    pub status: JobStatus,

    /// Percent complete, 0..=100.
    #[serde(default)]
    pub progress: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Reference to the produced output (only set once completed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<TargetId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a job record with no message, result, owner or timestamp.
    pub fn new(id: impl Into<String>, job_type: JobType, status: JobStatus, progress: u8) -> Self {
        Self {
            id: JobId::new(id),
            job_type,
            status,
            progress,
            message: None,
            result: None,
            owner_id: None,
            created_at: None,
        }
    }

    pub fn with_owner(mut self, owner: TargetId) -> Self {
        self.owner_id = Some(owner);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.0.is_empty() {
            return Err("job id is empty".to_string());
        }
        if self.progress > 100 {
            return Err(format!("progress {} out of range for job {}", self.progress, self.id));
        }
        if self.result.is_some() && self.status != JobStatus::Completed {
            return Err(format!("job {} carries a result while {:?}", self.id, self.status));
        }
        Ok(())
    }
}

/// Connection state of the streaming channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Identifies one opened channel. Every open gets a fresh id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signals a transport reports for an opened channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel finished its handshake.
    Opened,
    /// A text frame carrying one serialized job record.
    Message(String),
    /// The channel closed or failed. No clean shutdown is distinguished.
    Closed { reason: Option<String> },
}

/// Per-status tally of the jobs in a store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_full_record() {
        let job: Job = serde_json::from_value(json!({
            "id": "j1",
            "type": "multi-angle",
            "status": "running",
            "progress": 40,
            "message": "rendering view 2/4",
            "ownerId": "proj-1",
            "createdAt": "2024-05-01T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(job.id, JobId::new("j1"));
        assert_eq!(job.job_type, JobType::MultiAngle);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.progress, 40);
        assert_eq!(job.owner_id, Some(TargetId::new("proj-1")));
        assert!(job.created_at.is_some());
        assert!(job.result.is_none());
    }

    #[test]
    fn test_unknown_status_rejected() {
        let result: Result<Job, _> = serde_json::from_value(json!({
            "id": "j1",
            "type": "generation",
            "status": "paused"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_progress_defaults_to_zero() {
        let job: Job = serde_json::from_value(json!({
            "id": "j2",
            "type": "upscale",
            "status": "queued"
        }))
        .unwrap();
        assert_eq!(job.progress, 0);
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_progress() {
        let job = Job::new("j3", JobType::Refine, JobStatus::Running, 101);
        assert!(job.validate().is_err());

        let empty = Job::new("", JobType::Refine, JobStatus::Running, 0);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_validate_result_only_when_completed() {
        let done = Job::new("j4", JobType::Generation, JobStatus::Completed, 100)
            .with_result("outputs/j4.png");
        assert!(done.validate().is_ok());

        let running = Job::new("j5", JobType::Generation, JobStatus::Running, 60)
            .with_result("outputs/j5.png");
        assert!(running.validate().is_err());

        let failed = Job::new("j6", JobType::Upscale, JobStatus::Failed, 10).with_result("partial");
        assert!(failed.validate().is_err());
    }

    #[test]
    fn test_status_rank() {
        assert!(JobStatus::Queued.rank() < JobStatus::Running.rank());
        assert_eq!(JobStatus::Completed.rank(), JobStatus::Failed.rank());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_target_validation() {
        assert!(TargetId::new("proj-1").is_valid());
        assert!(TargetId::new("session_2.a").is_valid());
        assert!(!TargetId::new("").is_valid());
        assert!(!TargetId::new("a/b").is_valid());
        assert!(!TargetId::new("a b").is_valid());
    }
}
