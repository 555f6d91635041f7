//! Test doubles for the job orchestration core.
//!
//! In-memory implementations of the store and both collaborators, used by
//! the unit tests here and the scenario tests under `tests/`. The mocks can
//! be told to fail, and the fetcher can be held open to exercise
//! cancellation while a collaborator call is in flight.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::job::PreviewJob;
use super::store::JobStore;
use crate::kernel::traits::{BaseScriptRunner, BaseTemplateFetcher};

// ============================================================================
// In-memory store
// ============================================================================

/// Job store backed by a map, with switchable failure modes.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<Vec<PreviewJob>>,
    fail_writes: AtomicBool,
    fail_loads: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload a job, bypassing the failure switches. Used to stage a store
    /// as a previous process run left it.
    pub fn seed(&self, job: PreviewJob) {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(job);
    }

    /// Make every write fail until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every load fail until switched back.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Synchronous lookup for test assertions, unaffected by `fail_loads`.
    pub fn find_job(&self, job_id: Uuid) -> Option<PreviewJob> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|job| job.id == job_id)
            .cloned()
    }

    fn check_load(&self) -> Result<()> {
        if self.fail_loads.load(Ordering::SeqCst) {
            bail!("simulated storage read failure");
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn load_all_with_history(&self) -> Result<Vec<PreviewJob>> {
        self.check_load()?;
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<PreviewJob>> {
        self.check_load()?;
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|job| job.id == job_id)
            .cloned())
    }

    async fn upsert(&self, job: &PreviewJob) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("simulated storage write failure");
        }
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        match jobs.iter_mut().find(|existing| existing.id == job.id) {
            Some(existing) => *existing = job.clone(),
            None => jobs.push(job.clone()),
        }
        Ok(())
    }

    async fn delete(&self, job_id: Uuid) -> Result<bool> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let before = jobs.len();
        jobs.retain(|job| job.id != job_id);
        Ok(jobs.len() < before)
    }

    async fn find_submitted_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        self.check_load()?;
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|job| job.date_submitted < cutoff)
            .map(|job| job.id)
            .collect())
    }
}

// ============================================================================
// Mock collaborators
// ============================================================================

/// Shared behavior for both mock collaborators: invocation recording, a
/// failure switch, and a gate that holds calls open until released.
struct MockCall {
    invocations: RwLock<Vec<Uuid>>,
    fail_with: RwLock<Option<String>>,
    held: AtomicBool,
    gate: Semaphore,
}

impl MockCall {
    fn new() -> Self {
        Self {
            invocations: RwLock::new(Vec::new()),
            fail_with: RwLock::new(None),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    async fn enter(&self, job_id: Uuid) -> Result<()> {
        self.invocations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(job_id);

        if self.held.load(Ordering::SeqCst) {
            // Wait until the test releases the call. The permit is consumed
            // so one release() unblocks exactly one held call.
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }

        let fail = self
            .fail_with
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match fail {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }

    fn invocations(&self) -> Vec<Uuid> {
        self.invocations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_fail(&self, message: &str) {
        *self.fail_with.write().unwrap_or_else(|e| e.into_inner()) = Some(message.to_string());
    }

    fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.gate.add_permits(1);
    }

    async fn wait_until_invoked(&self) {
        for _ in 0..1000 {
            if !self.invocations().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("mock collaborator was never invoked");
    }
}

/// Template fetcher double. Records invocations; succeeds without touching
/// the filesystem unless told to fail.
pub struct MockTemplateFetcher {
    call: MockCall,
}

impl Default for MockTemplateFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTemplateFetcher {
    pub fn new() -> Self {
        Self {
            call: MockCall::new(),
        }
    }

    pub fn invocations(&self) -> Vec<Uuid> {
        self.call.invocations()
    }

    pub fn invocation_count(&self) -> usize {
        self.call.invocations().len()
    }

    /// Make every fetch fail with the given message.
    pub fn set_fail(&self, message: &str) {
        self.call.set_fail(message);
    }

    /// Hold every fetch open until [`release`](Self::release) is called.
    pub fn hold(&self) {
        self.call.hold();
    }

    /// Release one held fetch.
    pub fn release(&self) {
        self.call.release();
    }

    /// Wait (bounded) until at least one fetch has been recorded.
    pub async fn wait_until_invoked(&self) {
        self.call.wait_until_invoked().await;
    }
}

#[async_trait]
impl BaseTemplateFetcher for MockTemplateFetcher {
    async fn fetch(&self, job: &PreviewJob, _destination: &Path) -> Result<()> {
        self.call.enter(job.id).await
    }
}

/// Script runner double with the same switches as the fetcher.
pub struct MockScriptRunner {
    call: MockCall,
}

impl Default for MockScriptRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScriptRunner {
    pub fn new() -> Self {
        Self {
            call: MockCall::new(),
        }
    }

    pub fn invocations(&self) -> Vec<Uuid> {
        self.call.invocations()
    }

    pub fn invocation_count(&self) -> usize {
        self.call.invocations().len()
    }

    pub fn set_fail(&self, message: &str) {
        self.call.set_fail(message);
    }

    pub fn hold(&self) {
        self.call.hold();
    }

    pub fn release(&self) {
        self.call.release();
    }

    pub async fn wait_until_invoked(&self) {
        self.call.wait_until_invoked().await;
    }
}

#[async_trait]
impl BaseScriptRunner for MockScriptRunner {
    async fn run_script(&self, job: &PreviewJob) -> Result<()> {
        self.call.enter(job.id).await
    }
}
