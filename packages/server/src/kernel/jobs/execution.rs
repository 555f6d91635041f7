//! One live, cancellable run of a preview job's pipeline.
//!
//! A `JobExecution` is created by the manager for exactly one attempt and
//! never reused. `run()` drives fetch-template -> render sequentially,
//! checks the cancellation token at step boundaries only, and always leaves
//! the record in a terminal, timestamped state. It is the error boundary:
//! collaborator failures are recorded on the job and never propagate.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::job::{JobState, PreviewJob};
use super::store::JobUpdater;
use crate::kernel::traits::{BaseScriptRunner, BaseTemplateFetcher};
use crate::kernel::workspace::JobWorkspace;

pub struct JobExecution {
    job: Mutex<PreviewJob>,
    cancel: CancellationToken,
    updater: JobUpdater,
    fetcher: Arc<dyn BaseTemplateFetcher>,
    runner: Arc<dyn BaseScriptRunner>,
    workspace: JobWorkspace,
}

impl JobExecution {
    pub fn new(
        job: PreviewJob,
        updater: JobUpdater,
        fetcher: Arc<dyn BaseTemplateFetcher>,
        runner: Arc<dyn BaseScriptRunner>,
        workspace: JobWorkspace,
    ) -> Self {
        Self {
            job: Mutex::new(job),
            cancel: CancellationToken::new(),
            updater,
            fetcher,
            runner,
            workspace,
        }
    }

    /// Execute the job's pipeline. Never fails: every outcome (success,
    /// collaborator failure, cancellation) ends with a terminal state entry
    /// and a `date_completed` timestamp on the record.
    pub async fn run(&self) {
        let job_id = self.mark_started().await;
        info!(job_id = %job_id, "job started");

        let mut failed = false;

        if !self.is_cancelled() {
            if let Err(e) = self.fetch_template().await {
                self.record_failure("template fetch failed", &e).await;
                failed = true;
            }
        }

        if !failed && !self.is_cancelled() {
            if let Err(e) = self.render_preview().await {
                self.record_failure("preview render failed", &e).await;
                failed = true;
            }
        }

        self.finish().await;
    }

    /// Request cancellation. Idempotent, safe before, during or after `run()`.
    ///
    /// Once any terminal entry is in the log this is a pure no-op: the first
    /// terminal entry wins and the cancelled timestamp is left alone.
    pub async fn cancel(&self) {
        self.cancel.cancel();

        let mut job = self.job.lock().await;
        if job.has_terminal_state() {
            debug!(job_id = %job.id, "cancel requested after terminal state; ignoring");
            return;
        }

        info!(job_id = %job.id, "job cancelled");
        job.date_cancelled = Some(Utc::now());
        job.push_state(JobState::Cancelled);
        self.updater.try_update(&job).await;
    }

    /// Whether cancellation has been requested, independent of whether the
    /// job has reached a terminal state yet.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Clone of the current in-memory record.
    pub async fn snapshot(&self) -> PreviewJob {
        self.job.lock().await.clone()
    }

    async fn mark_started(&self) -> Uuid {
        let mut job = self.job.lock().await;
        job.date_started = Some(Utc::now());
        job.push_state(JobState::InProgress);
        self.updater.try_update(&job).await;
        job.id
    }

    async fn fetch_template(&self) -> anyhow::Result<()> {
        let snapshot = self.snapshot().await;
        let destination = self.workspace.template_path(snapshot.id);
        self.fetcher.fetch(&snapshot, &destination).await
    }

    async fn render_preview(&self) -> anyhow::Result<()> {
        let snapshot = self.snapshot().await;
        self.runner.run_script(&snapshot).await
    }

    async fn record_failure(&self, what: &str, error: &anyhow::Error) {
        let mut job = self.job.lock().await;

        // A collaborator bailing out after cancellation was requested is part
        // of the cancellation, not a job error; the cancel path owns the
        // terminal entry.
        if self.cancel.is_cancelled() {
            debug!(
                job_id = %job.id,
                error = %error,
                "collaborator returned after cancellation; not recorded as job error"
            );
            return;
        }

        warn!(job_id = %job.id, error = %error, "{}", what);
        job.set_error(what, &format!("{error:#}"));
        job.push_state(JobState::Error);
        self.updater.try_update(&job).await;
    }

    async fn finish(&self) {
        let mut job = self.job.lock().await;

        if job.has_terminal_state() {
            // The error or cancel path already recorded the outcome.
        } else if self.cancel.is_cancelled() {
            // Cancellation was requested but its persist lost the race with
            // the end of the pipeline; record it here.
            if job.date_cancelled.is_none() {
                job.date_cancelled = Some(Utc::now());
            }
            job.push_state(JobState::Cancelled);
        } else {
            job.push_state(JobState::PreviewGenerated);
        }

        job.date_completed = Some(Utc::now());
        self.updater.try_update(&job).await;
        info!(job_id = %job.id, terminal = ?job.terminal_state(), "job finished");
    }
}
