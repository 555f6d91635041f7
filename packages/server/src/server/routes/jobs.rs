//! Preview job endpoints.
//!
//! The wire shapes here are deliberately thin: the job record serializes as
//! is, and submission takes the caller's opaque params document verbatim.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::kernel::jobs::PreviewJob;
use crate::server::app::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("preview job {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Submit a new preview job. The body is the opaque params document.
pub async fn submit_job_handler(
    Extension(state): Extension<AppState>,
    Json(params): Json<serde_json::Value>,
) -> (StatusCode, Json<PreviewJob>) {
    let job = state.manager.submit(params).await;
    (StatusCode::CREATED, Json(job))
}

/// Current state of a job: live snapshot if running, else the store.
pub async fn get_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<PreviewJob>, ApiError> {
    let job = state
        .manager
        .job(job_id)
        .await?
        .ok_or(ApiError::NotFound(job_id))?;
    Ok(Json(job))
}

#[derive(Serialize)]
pub struct CancelResponse {
    job_id: Uuid,
    cancelled: bool,
}

/// Request cancellation. Cancelling a finished or unknown job reports
/// `cancelled: false` rather than failing.
pub async fn cancel_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<Uuid>,
) -> Json<CancelResponse> {
    let cancelled = state.manager.cancel(job_id).await;
    Json(CancelResponse { job_id, cancelled })
}

/// Cancel (if live) and remove a job with its artifacts.
pub async fn delete_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.manager.delete(job_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(job_id))
    }
}
