//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::kernel::jobs::JobManager;
use crate::server::routes::{
    cancel_job_handler, delete_job_handler, get_job_handler, health_handler, submit_job_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub manager: Arc<JobManager>,
}

/// Build the axum application.
pub fn build_app(db_pool: PgPool, manager: Arc<JobManager>) -> Router {
    let state = AppState { db_pool, manager };

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/preview-jobs", post(submit_job_handler))
        .route(
            "/api/preview-jobs/:job_id",
            get(get_job_handler).delete(delete_job_handler),
        )
        .route("/api/preview-jobs/:job_id/cancel", post(cancel_job_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}
