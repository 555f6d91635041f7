// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// The orchestration core treats both collaborators as black boxes: a call
// either completes or fails, and failures become the job's error state.
//
// Naming convention: Base* for trait names (e.g., BaseTemplateFetcher)

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::kernel::jobs::PreviewJob;

// =============================================================================
// Template Fetcher Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseTemplateFetcher: Send + Sync {
    /// Fetch the template artifact for a job into `destination`.
    ///
    /// Blocks (asynchronously) until the artifact is fully written or the
    /// fetch fails. Never preempted by job cancellation; a cancelled job
    /// simply skips the steps after the call returns.
    async fn fetch(&self, job: &PreviewJob, destination: &Path) -> Result<()>;
}

// =============================================================================
// Script Runner Trait (Infrastructure - external rendering tool)
// =============================================================================

#[async_trait]
pub trait BaseScriptRunner: Send + Sync {
    /// Run the rendering script for a job, producing the preview artifact.
    async fn run_script(&self, job: &PreviewJob) -> Result<()>;
}
