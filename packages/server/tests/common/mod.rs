// Common test utilities

use std::sync::Arc;
use std::time::Duration;

use preview_core::kernel::jobs::testing::{
    InMemoryJobStore, MockScriptRunner, MockTemplateFetcher,
};
use preview_core::kernel::jobs::{JobManager, PreviewJob};
use preview_core::kernel::{JobWorkspace, ServerDeps};
use uuid::Uuid;

/// Everything a scenario needs: the manager wired to an in-memory store and
/// mock collaborators, all of which the test can inspect and steer.
pub struct TestHarness {
    pub store: Arc<InMemoryJobStore>,
    pub fetcher: Arc<MockTemplateFetcher>,
    pub runner: Arc<MockScriptRunner>,
    pub manager: Arc<JobManager>,
}

impl TestHarness {
    /// Harness over an empty store.
    pub async fn new() -> Self {
        Self::with_store(Arc::new(InMemoryJobStore::new())).await
    }

    /// Harness over a pre-seeded store (for restart scenarios).
    pub async fn with_store(store: Arc<InMemoryJobStore>) -> Self {
        let fetcher = Arc::new(MockTemplateFetcher::new());
        let runner = Arc::new(MockScriptRunner::new());
        let workspace = JobWorkspace::new(
            std::env::temp_dir().join(format!("preview-test-{}", Uuid::new_v4())),
        );

        let manager = JobManager::start(ServerDeps::new(
            store.clone(),
            fetcher.clone(),
            runner.clone(),
            workspace,
        ))
        .await
        .expect("manager startup failed");

        Self {
            store,
            fetcher,
            runner,
            manager,
        }
    }

    /// Poll until the job has a `date_completed` and its execution has been
    /// dropped from the registry, then return the final record.
    pub async fn wait_until_finished(&self, job_id: Uuid) -> PreviewJob {
        for _ in 0..1000 {
            if self.manager.live_job_count().await == 0 {
                if let Some(job) = self.manager.job(job_id).await.expect("status query failed") {
                    if job.date_completed.is_some() {
                        return job;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} never finished");
    }
}
