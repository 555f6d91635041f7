//! Startup reconciliation of jobs orphaned by an unclean shutdown.
//!
//! A job whose state log has no terminal entry was in flight when the
//! previous process stopped; it cannot be resumed or reached, so it is
//! errored out before the service starts serving. Jobs that already reached
//! a terminal state are untouched, which makes repeated restarts idempotent.

use anyhow::{Context, Result};
use tracing::warn;

use super::job::JobState;
use super::store::JobStore;

/// User-facing message attached to jobs lost in a restart.
pub const RESTART_ERROR_MESSAGE: &str = "An internal server error occurred.";

/// Technical detail attached to jobs lost in a restart.
pub const RESTART_ERROR_DETAIL: &str =
    "Unrecoverable. The system restarted while the job was in progress.";

/// Error out every persisted job that never reached a terminal state.
///
/// Unlike the tolerant updates inside a running pipeline, a storage failure
/// here is fatal: the service must not start serving with an unreconciled
/// store. Returns the number of jobs reconciled.
pub async fn recover_orphaned_jobs(store: &dyn JobStore) -> Result<usize> {
    let jobs = store
        .load_all_with_history()
        .await
        .context("loading persisted jobs for recovery")?;

    let mut recovered = 0;
    for mut job in jobs {
        if job.has_terminal_state() {
            continue;
        }

        warn!(job_id = %job.id, "orphaned job found at startup; marking as errored");
        job.set_error(RESTART_ERROR_MESSAGE, RESTART_ERROR_DETAIL);
        job.push_state(JobState::Error);
        store
            .upsert(&job)
            .await
            .with_context(|| format!("persisting recovered job {}", job.id))?;
        recovered += 1;
    }

    Ok(recovered)
}
