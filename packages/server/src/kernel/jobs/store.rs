//! Durable persistence for preview jobs.
//!
//! The orchestration core talks to storage through the [`JobStore`] trait;
//! [`PostgresJobStore`] is the production implementation. Each job row is
//! written together with its full state log (last writer wins per record,
//! no multi-record transactions).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

use super::job::{JobState, JobStateEntry, PreviewJob};

/// Storage capability for preview jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Load every persisted job together with its full state log.
    async fn load_all_with_history(&self) -> Result<Vec<PreviewJob>>;

    /// Load a single job with its state log.
    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<PreviewJob>>;

    /// Write the job record and its state log, replacing any previous version.
    async fn upsert(&self, job: &PreviewJob) -> Result<()>;

    /// Remove a job and its state log. Returns whether a record existed.
    async fn delete(&self, job_id: Uuid) -> Result<bool>;

    /// Ids of jobs submitted before the cutoff, oldest first.
    async fn find_submitted_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>>;
}

// ============================================================================
// Tolerant persist policy
// ============================================================================

/// Persistence policy shared by the manager and its execution units.
///
/// A failed write is logged and otherwise ignored: the in-memory record is
/// the source of truth until the next successful persist. Nothing in a job's
/// pipeline is allowed to fail because storage was briefly unavailable.
#[derive(Clone)]
pub struct JobUpdater {
    store: Arc<dyn JobStore>,
}

impl JobUpdater {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Persist the current in-memory state of a job, logging (not raising)
    /// storage failures.
    pub async fn try_update(&self, job: &PreviewJob) {
        if let Err(e) = self.store.upsert(job).await {
            warn!(
                job_id = %job.id,
                error = %e,
                "failed to persist job update; in-memory state stands until the next successful write"
            );
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }
}

// ============================================================================
// Postgres implementation
// ============================================================================

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    params: serde_json::Value,
    date_submitted: DateTime<Utc>,
    date_started: Option<DateTime<Utc>>,
    date_completed: Option<DateTime<Utc>>,
    date_cancelled: Option<DateTime<Utc>>,
    is_error: bool,
    error_message: Option<String>,
    error_detail: Option<String>,
}

#[derive(FromRow)]
struct StateRow {
    job_id: Uuid,
    state: JobState,
    recorded_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self, state: Vec<JobStateEntry>) -> PreviewJob {
        PreviewJob {
            id: self.id,
            params: self.params,
            date_submitted: self.date_submitted,
            date_started: self.date_started,
            date_completed: self.date_completed,
            date_cancelled: self.date_cancelled,
            is_error: self.is_error,
            error_message: self.error_message,
            error_detail: self.error_detail,
            state,
        }
    }
}

const SELECT_JOB_COLUMNS: &str = r#"
    SELECT id, params, date_submitted, date_started, date_completed, date_cancelled,
           is_error, error_message, error_detail
    FROM preview_jobs
"#;

/// Postgres-backed job store.
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn states_for(&self, job_id: Uuid) -> Result<Vec<JobStateEntry>> {
        let rows: Vec<StateRow> = sqlx::query_as(
            r#"
            SELECT job_id, state, recorded_at
            FROM preview_job_states
            WHERE job_id = $1
            ORDER BY id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .context("loading job state log")?;

        Ok(rows
            .into_iter()
            .map(|row| JobStateEntry {
                state: row.state,
                recorded_at: row.recorded_at,
            })
            .collect())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn load_all_with_history(&self) -> Result<Vec<PreviewJob>> {
        let jobs: Vec<JobRow> = sqlx::query_as(SELECT_JOB_COLUMNS)
            .fetch_all(&self.pool)
            .await
            .context("loading persisted jobs")?;

        let states: Vec<StateRow> = sqlx::query_as(
            r#"
            SELECT job_id, state, recorded_at
            FROM preview_job_states
            ORDER BY job_id, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("loading job state logs")?;

        let mut by_job: HashMap<Uuid, Vec<JobStateEntry>> = HashMap::new();
        for row in states {
            by_job.entry(row.job_id).or_default().push(JobStateEntry {
                state: row.state,
                recorded_at: row.recorded_at,
            });
        }

        Ok(jobs
            .into_iter()
            .map(|row| {
                let state = by_job.remove(&row.id).unwrap_or_default();
                row.into_job(state)
            })
            .collect())
    }

    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<PreviewJob>> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("{SELECT_JOB_COLUMNS} WHERE id = $1"))
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
                .context("loading job by id")?;

        match row {
            Some(row) => {
                let state = self.states_for(job_id).await?;
                Ok(Some(row.into_job(state)))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, job: &PreviewJob) -> Result<()> {
        let mut tx = self.pool.begin().await.context("opening transaction")?;

        sqlx::query(
            r#"
            INSERT INTO preview_jobs
                (id, params, date_submitted, date_started, date_completed, date_cancelled,
                 is_error, error_message, error_detail)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                params = EXCLUDED.params,
                date_started = EXCLUDED.date_started,
                date_completed = EXCLUDED.date_completed,
                date_cancelled = EXCLUDED.date_cancelled,
                is_error = EXCLUDED.is_error,
                error_message = EXCLUDED.error_message,
                error_detail = EXCLUDED.error_detail
            "#,
        )
        .bind(job.id)
        .bind(&job.params)
        .bind(job.date_submitted)
        .bind(job.date_started)
        .bind(job.date_completed)
        .bind(job.date_cancelled)
        .bind(job.is_error)
        .bind(&job.error_message)
        .bind(&job.error_detail)
        .execute(&mut *tx)
        .await
        .context("writing job record")?;

        // The log is append-only in memory; rewriting it wholesale keeps the
        // store a plain last-writer-wins copy of the record.
        sqlx::query("DELETE FROM preview_job_states WHERE job_id = $1")
            .bind(job.id)
            .execute(&mut *tx)
            .await
            .context("clearing previous state log")?;

        for entry in &job.state {
            sqlx::query(
                r#"
                INSERT INTO preview_job_states (job_id, state, recorded_at)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(job.id)
            .bind(entry.state)
            .bind(entry.recorded_at)
            .execute(&mut *tx)
            .await
            .context("writing state log entry")?;
        }

        tx.commit().await.context("committing job update")?;
        Ok(())
    }

    async fn delete(&self, job_id: Uuid) -> Result<bool> {
        // State rows go with the job via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM preview_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .context("deleting job")?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_submitted_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM preview_jobs
            WHERE date_submitted < $1
            ORDER BY date_submitted
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .context("finding expired jobs")?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
