//! Server dependencies (using traits for testability)
//!
//! Central dependency container handed to the job manager at startup. All
//! external capabilities sit behind trait objects so tests can swap in the
//! in-memory doubles from `kernel::jobs::testing`; no ambient globals.

use std::sync::Arc;

use crate::kernel::jobs::JobStore;
use crate::kernel::traits::{BaseScriptRunner, BaseTemplateFetcher};
use crate::kernel::workspace::JobWorkspace;

/// Capabilities the job orchestration core is built from.
#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn JobStore>,
    pub template_fetcher: Arc<dyn BaseTemplateFetcher>,
    pub script_runner: Arc<dyn BaseScriptRunner>,
    pub workspace: JobWorkspace,
}

impl ServerDeps {
    pub fn new(
        store: Arc<dyn JobStore>,
        template_fetcher: Arc<dyn BaseTemplateFetcher>,
        script_runner: Arc<dyn BaseScriptRunner>,
        workspace: JobWorkspace,
    ) -> Self {
        Self {
            store,
            template_fetcher,
            script_runner,
            workspace,
        }
    }
}
