//! Preview job model and its append-only state log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

// ============================================================================
// State log
// ============================================================================

/// Lifecycle states recorded in a job's state log.
///
/// `PreviewGenerated`, `Cancelled` and `Error` are terminal: exactly one of
/// them ends every log, and the log is frozen once it is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "preview_job_state", rename_all = "snake_case")]
pub enum JobState {
    Created,
    InProgress,
    PreviewGenerated,
    Cancelled,
    Error,
}

impl JobState {
    /// Whether this state ends a job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::PreviewGenerated | JobState::Cancelled | JobState::Error
        )
    }
}

/// One entry in a job's state log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStateEntry {
    pub state: JobState,
    pub recorded_at: DateTime<Utc>,
}

// ============================================================================
// Job model
// ============================================================================

/// A requested preview build, tracked from submission to a terminal outcome.
///
/// `params` is opaque to the orchestration core: it belongs to the submitting
/// caller and is only handed through to the template and render collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct PreviewJob {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    #[builder(default = serde_json::Value::Null)]
    pub params: serde_json::Value,

    // Timestamps, each set at most once
    #[builder(default = Utc::now())]
    pub date_submitted: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub date_started: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub date_completed: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub date_cancelled: Option<DateTime<Utc>>,

    // Error latch: never cleared once set
    #[builder(default)]
    pub is_error: bool,
    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_detail: Option<String>,

    /// Append-only, time-ordered state log. The authoritative record of the
    /// job's outcome.
    #[builder(default)]
    pub state: Vec<JobStateEntry>,
}

impl PreviewJob {
    /// Create a freshly submitted job with a `Created` state entry.
    pub fn new(params: serde_json::Value) -> Self {
        let mut job = Self::builder().params(params).build();
        job.push_state(JobState::Created);
        job
    }

    /// Append a state entry to the log.
    ///
    /// Refused (returns `false`) once a terminal entry is present: the first
    /// terminal entry wins and the log is frozen afterwards.
    pub fn push_state(&mut self, state: JobState) -> bool {
        if self.has_terminal_state() {
            return false;
        }
        self.state.push(JobStateEntry {
            state,
            recorded_at: Utc::now(),
        });
        true
    }

    /// Latch the error flag with a user-facing message and a technical detail.
    ///
    /// The first error wins; later calls are ignored.
    pub fn set_error(&mut self, message: &str, detail: &str) {
        if self.is_error {
            return;
        }
        self.is_error = true;
        self.error_message = Some(message.to_string());
        self.error_detail = Some(detail.to_string());
    }

    /// Whether the state log already contains a terminal entry.
    pub fn has_terminal_state(&self) -> bool {
        self.state.iter().any(|entry| entry.state.is_terminal())
    }

    /// The terminal state of this job, if it has reached one.
    pub fn terminal_state(&self) -> Option<JobState> {
        self.state
            .iter()
            .find(|entry| entry.state.is_terminal())
            .map(|entry| entry.state)
    }

    /// The most recently recorded state.
    pub fn latest_state(&self) -> Option<JobState> {
        self.state.last().map(|entry| entry.state)
    }
}
