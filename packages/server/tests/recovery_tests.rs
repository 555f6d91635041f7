//! Restart scenarios: jobs persisted without a terminal state are errored
//! out before the manager serves anything.

mod common;

use std::sync::Arc;

use common::TestHarness;
use preview_core::kernel::jobs::testing::{
    InMemoryJobStore, MockScriptRunner, MockTemplateFetcher,
};
use preview_core::kernel::jobs::{
    JobManager, JobState, PreviewJob, RESTART_ERROR_DETAIL, RESTART_ERROR_MESSAGE,
};
use preview_core::kernel::{JobWorkspace, ServerDeps};
use uuid::Uuid;

/// A record as a crashed process would have left it: submitted, maybe
/// started, but with no terminal state entry.
fn in_flight_job() -> PreviewJob {
    let mut job = PreviewJob::new(serde_json::json!({"book": "REV"}));
    job.push_state(JobState::InProgress);
    job.date_started = Some(chrono::Utc::now());
    job
}

#[tokio::test]
async fn startup_errors_out_jobs_without_a_terminal_state() {
    let store = Arc::new(InMemoryJobStore::new());
    let orphan = in_flight_job();
    let orphan_id = orphan.id;
    store.seed(orphan);

    let h = TestHarness::with_store(store).await;

    let job = h.manager.job(orphan_id).await.unwrap().unwrap();
    assert_eq!(job.latest_state(), Some(JobState::Error));
    assert!(job.is_error);
    assert_eq!(job.error_message.as_deref(), Some(RESTART_ERROR_MESSAGE));
    assert_eq!(job.error_detail.as_deref(), Some(RESTART_ERROR_DETAIL));
}

#[tokio::test]
async fn startup_recovers_a_job_with_only_a_created_entry() {
    let store = Arc::new(InMemoryJobStore::new());
    // Crashed between submission and the first pipeline step.
    let job = PreviewJob::new(serde_json::Value::Null);
    let job_id = job.id;
    store.seed(job);

    let h = TestHarness::with_store(store).await;

    let job = h.manager.job(job_id).await.unwrap().unwrap();
    let states: Vec<JobState> = job.state.iter().map(|e| e.state).collect();
    assert_eq!(states, vec![JobState::Created, JobState::Error]);
}

#[tokio::test]
async fn startup_leaves_terminal_jobs_alone() {
    let store = Arc::new(InMemoryJobStore::new());

    let mut done = PreviewJob::new(serde_json::Value::Null);
    done.push_state(JobState::PreviewGenerated);
    let done_id = done.id;
    let done_states = done.state.len();
    store.seed(done);

    let h = TestHarness::with_store(store).await;

    let job = h.manager.job(done_id).await.unwrap().unwrap();
    assert_eq!(job.latest_state(), Some(JobState::PreviewGenerated));
    assert_eq!(job.state.len(), done_states);
    assert!(!job.is_error);
}

#[tokio::test]
async fn repeated_restarts_change_nothing_further() {
    let store = Arc::new(InMemoryJobStore::new());
    let orphan = in_flight_job();
    let orphan_id = orphan.id;
    store.seed(orphan);

    // First restart reconciles.
    let _ = TestHarness::with_store(store.clone()).await;
    let after_first = store.find_job(orphan_id).expect("job must survive recovery");

    // Second restart over the already-reconciled store.
    let _ = TestHarness::with_store(store.clone()).await;
    let after_second = store.find_job(orphan_id).expect("job must survive recovery");

    assert_eq!(after_second.state.len(), after_first.state.len());
    assert_eq!(after_second.error_detail, after_first.error_detail);
    assert_eq!(after_second.latest_state(), Some(JobState::Error));
}

#[tokio::test]
async fn startup_fails_loudly_when_the_store_cannot_be_read() {
    let store = Arc::new(InMemoryJobStore::new());
    store.set_fail_loads(true);

    let fetcher = Arc::new(MockTemplateFetcher::new());
    let runner = Arc::new(MockScriptRunner::new());
    let workspace =
        JobWorkspace::new(std::env::temp_dir().join(format!("preview-test-{}", Uuid::new_v4())));

    let result = JobManager::start(ServerDeps::new(store, fetcher, runner, workspace)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn recovered_jobs_are_queryable_like_any_other() {
    let store = Arc::new(InMemoryJobStore::new());
    let orphan = in_flight_job();
    let orphan_id = orphan.id;
    store.seed(orphan);

    let h = TestHarness::with_store(store).await;

    // New submissions work normally alongside the recovered record.
    let fresh = h.manager.submit(serde_json::Value::Null).await;
    let fresh = h.wait_until_finished(fresh.id).await;
    assert_eq!(fresh.latest_state(), Some(JobState::PreviewGenerated));

    let recovered = h.manager.job(orphan_id).await.unwrap().unwrap();
    assert_eq!(recovered.latest_state(), Some(JobState::Error));
}
