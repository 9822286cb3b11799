//! Job polling and cancellation endpoints

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::ProcessingJob;
use crate::AppState;

/// GET /jobs/{id}
///
/// Poll a job's status, counters and log.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProcessingJob>> {
    let job = state
        .jobs
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("job {}", id)))?;

    Ok(Json(job))
}

/// POST /jobs/{id}/cancel
///
/// Request cancellation. The running task observes the token at its next
/// checkpoint and transitions the job itself; a terminal job is returned
/// as-is.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProcessingJob>> {
    let job = state
        .jobs
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("job {}", id)))?;

    if job.is_terminal() {
        tracing::debug!(job_id = %id, status = ?job.status, "Cancel requested on terminal job");
        return Ok(Json(job));
    }

    if let Some(token) = state.cancellation_tokens.read().await.get(&id) {
        token.cancel();
        tracing::info!(job_id = %id, "Cancellation requested");
    } else {
        tracing::warn!(job_id = %id, "No cancellation token registered for job");
    }

    let job = state
        .jobs
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("job {}", id)))?;

    Ok(Json(job))
}

/// Build job routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/cancel", post(cancel_job))
}
