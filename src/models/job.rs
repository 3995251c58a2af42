use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Kind of inference job; determines which model handler the worker binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    /// Volume segmentation producing a directory of mesh files.
    Segmentation,
    /// Landmark inference producing a computed-plane report.
    Plane,
}

/// The imaging study a job operates on. Together with the path resolver this
/// is sufficient to recompute every object-store key the job touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRef {
    pub user_id: String,
    pub case_id: String,
}

impl CaseRef {
    pub fn new(user_id: impl Into<String>, case_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            case_id: case_id.into(),
        }
    }
}

/// Status of a job in the queue's result backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Terminal states have no outgoing transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Legal transitions: pending -> running -> {succeeded|failed}.
    /// Re-claiming a running job is allowed for redelivery after a worker crash.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Running) => true,
            (JobStatus::Running, JobStatus::Running) => true,
            (JobStatus::Running, JobStatus::Succeeded) => true,
            (JobStatus::Running, JobStatus::Failed) => true,
            _ => false,
        }
    }

    /// Celery-compatible state name exposed by the result endpoint.
    pub fn as_wire_state(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "STARTED",
            JobStatus::Succeeded => "SUCCESS",
            JobStatus::Failed => "FAILURE",
        }
    }
}

/// Point-in-time view of a job record as stored in the result backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub kind: JobKind,
    pub case: CaseRef,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    /// Present only when status is `succeeded`.
    pub result: Option<serde_json::Value>,
    /// Present only when status is `failed`.
    pub error: Option<String>,
}
