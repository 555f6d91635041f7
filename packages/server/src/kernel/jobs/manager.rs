//! Job manager: the single authority for creating, tracking, persisting,
//! cancelling and recovering preview jobs.
//!
//! # Architecture
//!
//! ```text
//! caller ─► JobManager.submit(params)
//!     │         ├─► persist Created record (tolerant)
//!     │         ├─► register JobExecution under the job id
//!     │         └─► tokio::spawn(execution.run())  ── fire and forget
//!     │                  └─► entry removed when run() returns
//!     ├─► JobManager.cancel(id)  ── proxied to the live execution
//!     └─► JobManager.job(id)     ── live snapshot, else the store
//! ```
//!
//! The id -> execution map is the only shared mutable structure in the core;
//! everything goes through the manager's synchronized methods.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::execution::JobExecution;
use super::job::PreviewJob;
use super::recovery::recover_orphaned_jobs;
use super::store::JobUpdater;
use crate::kernel::deps::ServerDeps;
use crate::kernel::traits::{BaseScriptRunner, BaseTemplateFetcher};
use crate::kernel::workspace::JobWorkspace;

pub struct JobManager {
    updater: JobUpdater,
    fetcher: Arc<dyn BaseTemplateFetcher>,
    runner: Arc<dyn BaseScriptRunner>,
    workspace: JobWorkspace,
    /// Live executions, keyed by job id. An id maps to at most one execution;
    /// entries are removed when the run finishes, whatever the outcome.
    executions: RwLock<HashMap<Uuid, Arc<JobExecution>>>,
}

impl JobManager {
    /// Reconcile the durable store with the previous process run, then hand
    /// out a ready manager. Recovery failure is fatal: the service must not
    /// serve against an unreconciled store.
    pub async fn start(deps: ServerDeps) -> Result<Arc<Self>> {
        let recovered = recover_orphaned_jobs(deps.store.as_ref())
            .await
            .context("startup job recovery failed")?;
        if recovered > 0 {
            info!(count = recovered, "errored out orphaned jobs from previous run");
        }

        Ok(Arc::new(Self {
            updater: JobUpdater::new(deps.store),
            fetcher: deps.template_fetcher,
            runner: deps.script_runner,
            workspace: deps.workspace,
            executions: RwLock::new(HashMap::new()),
        }))
    }

    /// Create, persist and launch a new preview job. Returns the record
    /// immediately; the pipeline runs on its own task and the caller polls
    /// status separately.
    pub async fn submit(self: &Arc<Self>, params: serde_json::Value) -> PreviewJob {
        let job = PreviewJob::new(params);
        info!(job_id = %job.id, "job submitted");
        self.updater.try_update(&job).await;

        let execution = Arc::new(JobExecution::new(
            job.clone(),
            self.updater.clone(),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.runner),
            self.workspace.clone(),
        ));
        self.executions
            .write()
            .await
            .insert(job.id, Arc::clone(&execution));

        let manager = Arc::clone(self);
        let job_id = job.id;
        tokio::spawn(async move {
            // run() is the error boundary and never fails; the task exists
            // only to drive it and drop the registry entry afterwards.
            execution.run().await;
            manager.executions.write().await.remove(&job_id);
        });

        job
    }

    /// Cancel a live job. Returns whether a live execution was found;
    /// cancelling a finished or unknown job is a reported no-op.
    pub async fn cancel(&self, job_id: Uuid) -> bool {
        let execution = self.executions.read().await.get(&job_id).cloned();
        match execution {
            Some(execution) => {
                execution.cancel().await;
                true
            }
            None => {
                debug!(job_id = %job_id, "cancel requested for a job with no live execution");
                false
            }
        }
    }

    /// Current state of a job: the live in-memory record when an execution is
    /// registered (authoritative between persists), otherwise the store.
    pub async fn job(&self, job_id: Uuid) -> Result<Option<PreviewJob>> {
        let execution = self.executions.read().await.get(&job_id).cloned();
        if let Some(execution) = execution {
            return Ok(Some(execution.snapshot().await));
        }
        self.updater.store().find_by_id(job_id).await
    }

    /// Persist the current in-memory state of a job record. Storage failures
    /// are logged as warnings; the in-memory mutation stands either way.
    pub async fn try_update(&self, job: &PreviewJob) {
        self.updater.try_update(job).await;
    }

    /// Cancel (if live) and remove a job: durable record, state log and
    /// workspace artifacts. Returns whether a record existed.
    pub async fn delete(&self, job_id: Uuid) -> Result<bool> {
        let execution = self.executions.read().await.get(&job_id).cloned();
        if let Some(execution) = execution {
            execution.cancel().await;
        }

        let removed = self.updater.store().delete(job_id).await?;
        if removed {
            self.workspace.remove_job_files(job_id).await?;
            info!(job_id = %job_id, "job deleted");
        }
        Ok(removed)
    }

    /// Delete every job submitted more than `max_age` ago. Returns the number
    /// of jobs removed.
    pub async fn cleanup_expired(&self, max_age: Duration) -> Result<u64> {
        let cutoff = Utc::now() - max_age;
        let expired = self.updater.store().find_submitted_before(cutoff).await?;

        let mut removed = 0u64;
        for job_id in expired {
            if self.delete(job_id).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(count = removed, "expired preview jobs removed");
        }
        Ok(removed)
    }

    /// Number of currently live executions.
    pub async fn live_job_count(&self) -> usize {
        self.executions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use uuid::Uuid;

    use super::super::testing::{InMemoryJobStore, MockScriptRunner, MockTemplateFetcher};
    use super::super::{JobState, JobStore, PreviewJob};
    use super::JobManager;
    use crate::kernel::deps::ServerDeps;
    use crate::kernel::workspace::JobWorkspace;

    struct Fixture {
        store: Arc<InMemoryJobStore>,
        fetcher: Arc<MockTemplateFetcher>,
        runner: Arc<MockScriptRunner>,
        manager: Arc<JobManager>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryJobStore::new());
        let fetcher = Arc::new(MockTemplateFetcher::new());
        let runner = Arc::new(MockScriptRunner::new());
        let workspace =
            JobWorkspace::new(std::env::temp_dir().join(format!("preview-{}", Uuid::new_v4())));

        let manager = JobManager::start(ServerDeps::new(
            store.clone(),
            fetcher.clone(),
            runner.clone(),
            workspace,
        ))
        .await
        .unwrap();

        Fixture {
            store,
            fetcher,
            runner,
            manager,
        }
    }

    async fn wait_until_finished(f: &Fixture, job_id: Uuid) {
        for _ in 0..1000 {
            let done = f
                .manager
                .job(job_id)
                .await
                .unwrap()
                .is_some_and(|job| job.date_completed.is_some())
                && f.manager.live_job_count().await == 0;
            if done {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        panic!("job {job_id} never finished");
    }

    #[tokio::test]
    async fn submit_runs_job_to_completion() {
        let f = fixture().await;
        let job = f.manager.submit(serde_json::json!({"book": "PSA"})).await;

        wait_until_finished(&f, job.id).await;

        let finished = f.manager.job(job.id).await.unwrap().unwrap();
        assert_eq!(finished.terminal_state(), Some(JobState::PreviewGenerated));
        assert_eq!(f.fetcher.invocation_count(), 1);
        assert_eq!(f.runner.invocation_count(), 1);
    }

    #[tokio::test]
    async fn registry_entry_is_removed_after_the_run() {
        let f = fixture().await;
        let job = f.manager.submit(serde_json::Value::Null).await;

        wait_until_finished(&f, job.id).await;
        assert_eq!(f.manager.live_job_count().await, 0);

        // Status now comes from the store.
        let from_store = f.store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(from_store.terminal_state(), Some(JobState::PreviewGenerated));
    }

    #[tokio::test]
    async fn cancel_of_unknown_job_is_a_reported_noop() {
        let f = fixture().await;
        assert!(!f.manager.cancel(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn delete_removes_record_and_reports_missing_jobs() {
        let f = fixture().await;
        let job = f.manager.submit(serde_json::Value::Null).await;
        wait_until_finished(&f, job.id).await;

        assert!(f.manager.delete(job.id).await.unwrap());
        assert!(f.manager.job(job.id).await.unwrap().is_none());
        assert!(!f.manager.delete(job.id).await.unwrap());
    }

    #[tokio::test]
    async fn try_update_tolerates_storage_failures() {
        let f = fixture().await;
        let job = PreviewJob::new(serde_json::Value::Null);

        f.store.set_fail_writes(true);
        f.manager.try_update(&job).await;
        assert!(f.store.find_by_id(job.id).await.unwrap().is_none());

        // The in-memory record was unaffected; the next persist lands.
        f.store.set_fail_writes(false);
        f.manager.try_update(&job).await;
        assert!(f.store.find_by_id(job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cleanup_expired_only_removes_old_jobs() {
        let f = fixture().await;
        let job = f.manager.submit(serde_json::Value::Null).await;
        wait_until_finished(&f, job.id).await;

        // Everything was submitted just now; a one-hour horizon keeps it.
        assert_eq!(f.manager.cleanup_expired(Duration::hours(1)).await.unwrap(), 0);
        assert!(f.manager.job(job.id).await.unwrap().is_some());

        // A zero-second horizon expires it.
        assert_eq!(f.manager.cleanup_expired(Duration::zero()).await.unwrap(), 1);
        assert!(f.manager.job(job.id).await.unwrap().is_none());
    }
}
