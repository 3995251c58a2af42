use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{CaseRef, JobKind, JobStatus};
use crate::models::predict::{PredictRequest, PredictResponse, TaskStatusResponse};
use crate::routes::ApiError;

/// POST /predict — enqueue a segmentation job for a study.
pub async fn submit_segmentation(
    State(state): State<AppState>,
    Json(req): Json<PredictRequest>,
) -> Result<(StatusCode, Json<PredictResponse>), ApiError> {
    submit(&state, req, JobKind::Segmentation).await
}

/// POST /predict/plane — enqueue a landmark/plane job for a study.
pub async fn submit_plane(
    State(state): State<AppState>,
    Json(req): Json<PredictRequest>,
) -> Result<(StatusCode, Json<PredictResponse>), ApiError> {
    submit(&state, req, JobKind::Plane).await
}

/// Validate the request and enqueue the job. Returns synchronously with the
/// new task id; execution is entirely the workers' concern. Submissions are
/// not deduplicated: identical arguments produce independent jobs.
async fn submit(
    state: &AppState,
    req: PredictRequest,
    kind: JobKind,
) -> Result<(StatusCode, Json<PredictResponse>), ApiError> {
    req.validate()
        .map_err(|e| ApiError::InvalidArgument(e.to_string()))?;

    let case = CaseRef::new(req.uid, req.cid);
    let task_id = state.queue.enqueue(kind, &case).await?;

    metrics::counter!("inference_jobs_submitted_total", "kind" => kind.to_string()).increment(1);
    tracing::info!(
        task_id = %task_id,
        kind = %kind,
        user_id = %case.user_id,
        case_id = %case.case_id,
        "job submitted"
    );

    Ok((StatusCode::ACCEPTED, Json(PredictResponse { task_id })))
}

/// GET /result/{task_id} — poll a job's state.
///
/// Pure read projection over the queue's result backend; never mutates job
/// state. Unknown or unparseable ids report 404.
pub async fn get_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let job_id = Uuid::parse_str(&task_id).map_err(|_| ApiError::NotFound)?;

    let record = state
        .queue
        .fetch_record(job_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(project(record)))
}

/// Map a job record onto the polling body: non-terminal states carry an
/// informational placeholder, success carries only the result, failure
/// carries only the captured description.
fn project(record: crate::models::job::JobRecord) -> TaskStatusResponse {
    let state = record.status.as_wire_state().to_string();
    match record.status {
        JobStatus::Pending => TaskStatusResponse {
            state,
            status: Some("Pending...".to_string()),
            result: None,
        },
        JobStatus::Running => TaskStatusResponse {
            state,
            status: Some("Processing...".to_string()),
            result: None,
        },
        JobStatus::Succeeded => TaskStatusResponse {
            state,
            status: None,
            result: record.result,
        },
        JobStatus::Failed => TaskStatusResponse {
            state,
            status: record.error.or_else(|| Some("unknown failure".to_string())),
            result: None,
        },
    }
}
