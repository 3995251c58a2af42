use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for POST /predict and POST /predict/plane.
///
/// Both identifiers are embedded verbatim in object-store keys, so besides
/// being non-empty they are capped at 128 characters to keep derived keys
/// bounded.
#[derive(Debug, Deserialize, Validate)]
pub struct PredictRequest {
    /// Doctor/user identifier owning the study.
    #[garde(length(min = 1, max = 128))]
    pub uid: String,

    /// Case identifier of the imaging study.
    #[garde(length(min = 1, max = 128))]
    pub cid: String,
}

/// Response after a job has been enqueued.
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub task_id: Uuid,
}

/// Response for GET /result/{task_id}, mirroring the Celery polling shape:
/// `status` carries a human-readable placeholder or failure description,
/// `result` carries the stored payload once the job has succeeded.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}
