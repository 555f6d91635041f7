//! Preview job orchestration.
//!
//! This module is the core of the service:
//! - [`PreviewJob`] - the durable job record with its append-only state log
//! - [`JobExecution`] - one live, cancellable run of a job's pipeline
//! - [`JobManager`] - registry of live executions and persistence authority
//! - [`recover_orphaned_jobs`] - startup reconciliation after unclean exits
//!
//! # Architecture
//!
//! ```text
//! JobManager.submit(params)
//!     │
//!     ├─► persist PreviewJob { state: [Created] }
//!     └─► JobExecution.run()          (own tokio task)
//!             ├─► mark started, persist
//!             ├─► fetch template      (skipped when cancelled)
//!             ├─► run render script   (skipped when cancelled or failed)
//!             └─► terminal entry + completed timestamp, persist
//! ```
//!
//! Cancellation is cooperative: `JobExecution.cancel()` trips a token that
//! `run()` consults at step boundaries; in-flight collaborator calls are
//! never preempted.

mod execution;
mod job;
mod manager;
mod recovery;
mod store;
pub mod testing;

pub use execution::JobExecution;
pub use job::{JobState, JobStateEntry, PreviewJob};
pub use manager::JobManager;
pub use recovery::{recover_orphaned_jobs, RESTART_ERROR_DETAIL, RESTART_ERROR_MESSAGE};
pub use store::{JobStore, JobUpdater, PostgresJobStore};
