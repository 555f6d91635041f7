//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! Finished preview jobs are not kept forever: a periodic task deletes jobs
//! (records and workspace artifacts) older than the configured maximum age.
//! Failures are logged and retried on the next tick, never fatal.

use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::kernel::jobs::JobManager;

/// Start all scheduled tasks
pub async fn start_scheduler(manager: Arc<JobManager>, max_age: Duration) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Expired-job cleanup - runs every 10 minutes
    let cleanup_manager = Arc::clone(&manager);
    let cleanup_job = Job::new_async("0 */10 * * * *", move |_uuid, _lock| {
        let manager = Arc::clone(&cleanup_manager);
        Box::pin(async move {
            match manager.cleanup_expired(max_age).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "preview job cleanup pass finished"),
                Err(e) => tracing::error!(error = %e, "preview job cleanup failed"),
            }
        })
    })?;

    scheduler.add(cleanup_job).await?;
    scheduler.start().await?;

    tracing::info!("Scheduled tasks started (expired preview job cleanup every 10 minutes)");
    Ok(scheduler)
}
