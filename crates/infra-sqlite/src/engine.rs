// SQLite QueueEngine Implementation

use async_trait::async_trait;
use conveyor_core::domain::{
    CleanBucket, EngineJobState, JobCounts, JobId, QueueName, QueuedJob,
};
use conveyor_core::error::{AppError, Result};
use conveyor_core::port::{IdProvider, JobOutcome, NewJob, QueueEngine, TimeProvider};
use sqlx::{Sqlite, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

const STATE_WAITING: &str = "WAITING";
const STATE_DELAYED: &str = "DELAYED";
const STATE_ACTIVE: &str = "ACTIVE";

// The only unique index besides seq is idx_jobs_pending_id, so a conflict
// means a waiting, delayed or active job already holds the id
const INSERT_JOB: &str = r#"
    INSERT INTO jobs (id, queue, name, data, state, priority, run_at, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT DO NOTHING
"#;

/// Durable queue engine on a single SQLite database
///
/// Every state transition is one statement, so claims and dedup stay
/// atomic across any number of workers sharing the pool.
pub struct SqliteQueueEngine {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
}

impl SqliteQueueEngine {
    pub fn new(
        pool: SqlitePool,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            pool,
            time_provider,
            id_provider,
        }
    }

    /// Move jobs left active by a previous process back to waiting
    ///
    /// Call once at startup, before workers start claiming.
    ///
    /// # Returns
    /// Number of recovered jobs
    pub async fn recover_orphaned(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, started_at = NULL
            WHERE state = ?
            "#,
        )
        .bind(STATE_WAITING)
        .bind(STATE_ACTIVE)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            info!(recovered, "Recovered orphaned jobs");
        }
        Ok(recovered)
    }

    async fn insert<'e, E>(&self, executor: E, queue: QueueName, job: NewJob) -> Result<JobId>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let now = self.time_provider.now_millis();
        let delay_ms = job.options.delay_ms.unwrap_or(0);
        let run_at = i64::try_from(delay_ms)
            .ok()
            .and_then(|delay| now.checked_add(delay))
            .ok_or_else(|| {
                AppError::Validation(format!("Job delay out of range: {} ms", delay_ms))
            })?;
        let state = if delay_ms > 0 { STATE_DELAYED } else { STATE_WAITING };
        let id = job
            .options
            .job_id
            .clone()
            .unwrap_or_else(|| self.id_provider.generate_id());

        let result = sqlx::query(INSERT_JOB)
            .bind(&id)
            .bind(queue.as_str())
            .bind(&job.name)
            .bind(job.data.to_string())
            .bind(state)
            .bind(job.options.priority.unwrap_or(0))
            .bind(run_at)
            .bind(now)
            .execute(executor)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            debug!(queue = %queue, job_id = %id, "Job id already pending, submission coalesced");
        }
        Ok(id)
    }
}

#[async_trait]
impl QueueEngine for SqliteQueueEngine {
    async fn add(&self, queue: QueueName, job: NewJob) -> Result<JobId> {
        self.insert(&self.pool, queue, job).await
    }

    async fn add_bulk(&self, queue: QueueName, jobs: Vec<NewJob>) -> Result<Vec<JobId>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            ids.push(self.insert(&mut *tx, queue, job).await?);
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(queue = %queue, count = ids.len(), "Bulk added jobs");
        Ok(ids)
    }

    async fn pause(&self, queue: QueueName) -> Result<()> {
        set_paused(&self.pool, queue, true).await
    }

    async fn resume(&self, queue: QueueName) -> Result<()> {
        set_paused(&self.pool, queue, false).await
    }

    async fn is_paused(&self, queue: QueueName) -> Result<bool> {
        let paused: Option<i64> = sqlx::query_scalar("SELECT paused FROM queues WHERE name = ?")
            .bind(queue.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(paused.unwrap_or(0) != 0)
    }

    async fn drain(&self, queue: QueueName) -> Result<u64> {
        let now = self.time_provider.now_millis();
        // Delayed jobs past their run time count as waiting
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE queue = ?
              AND (state = ? OR (state = ? AND run_at <= ?))
            "#,
        )
        .bind(queue.as_str())
        .bind(STATE_WAITING)
        .bind(STATE_DELAYED)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn clean(
        &self,
        queue: QueueName,
        bucket: CleanBucket,
        grace_ms: i64,
        limit: u32,
    ) -> Result<Vec<JobId>> {
        let cutoff = self.time_provider.now_millis() - grace_ms;

        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            DELETE FROM jobs
            WHERE seq IN (
                SELECT seq FROM jobs
                WHERE queue = ? AND state = ? AND finished_at <= ?
                ORDER BY finished_at ASC, seq ASC
                LIMIT ?
            )
            RETURNING id
            "#,
        )
        .bind(queue.as_str())
        .bind(bucket.state().as_str())
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(ids)
    }

    async fn job_counts(&self, queue: QueueName) -> Result<JobCounts> {
        let now = self.time_provider.now_millis();

        let (active, completed, failed, delayed, pending): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COALESCE(SUM(CASE WHEN state = 'ACTIVE' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN state = 'COMPLETED' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN state = 'FAILED' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN state = 'DELAYED' AND run_at > ? THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN state = 'WAITING'
                                        OR (state = 'DELAYED' AND run_at <= ?) THEN 1 ELSE 0 END), 0)
                FROM jobs
                WHERE queue = ?
                "#,
            )
            .bind(now)
            .bind(now)
            .bind(queue.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let paused = self.is_paused(queue).await?;
        Ok(JobCounts {
            active: active as u64,
            completed: completed as u64,
            failed: failed as u64,
            delayed: delayed as u64,
            waiting: if paused { 0 } else { pending as u64 },
            paused: if paused { pending as u64 } else { 0 },
        })
    }

    async fn active_count(&self, queue: QueueName) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE queue = ? AND state = ?")
                .bind(queue.as_str())
                .bind(STATE_ACTIVE)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(count as u64)
    }

    async fn get_job(&self, queue: QueueName, id: &str) -> Result<Option<QueuedJob>> {
        // A reused id may also have finished rows, the newest one wins
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE queue = ? AND id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(queue.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn remove_job(&self, queue: QueueName, id: &str) -> Result<bool> {
        // Every row under the id goes, unless one of them is being processed
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE queue = ? AND id = ?
              AND NOT EXISTS (
                  SELECT 1 FROM jobs a WHERE a.queue = ? AND a.id = ? AND a.state = ?
              )
            "#,
        )
        .bind(queue.as_str())
        .bind(id)
        .bind(queue.as_str())
        .bind(id)
        .bind(STATE_ACTIVE)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE queue = ? AND id = ? AND state = ?",
        )
        .bind(queue.as_str())
        .bind(id)
        .bind(STATE_ACTIVE)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if active > 0 {
            return Err(AppError::Conflict(format!(
                "Job {} is active and cannot be removed",
                id
            )));
        }
        Ok(false)
    }

    async fn claim_next(&self, queue: QueueName) -> Result<Option<QueuedJob>> {
        let now = self.time_provider.now_millis();

        // Select and mark in one statement so two claimers never get the same job
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = ?, started_at = ?
            WHERE seq = (
                SELECT j.seq FROM jobs j
                WHERE j.queue = ?
                  AND j.state IN (?, ?)
                  AND j.run_at <= ?
                  AND NOT EXISTS (
                      SELECT 1 FROM queues q WHERE q.name = j.queue AND q.paused = 1
                  )
                ORDER BY j.priority DESC, j.seq ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(STATE_ACTIVE)
        .bind(now)
        .bind(queue.as_str())
        .bind(STATE_WAITING)
        .bind(STATE_DELAYED)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn finish(&self, queue: QueueName, id: &str, outcome: JobOutcome) -> Result<()> {
        let now = self.time_provider.now_millis();
        let (state, reason) = match outcome {
            JobOutcome::Completed => (EngineJobState::Completed, None),
            JobOutcome::Failed(reason) => (EngineJobState::Failed, Some(reason)),
        };

        // Conditional update: only an active job can finish
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, finished_at = ?, failed_reason = ?
            WHERE queue = ? AND id = ? AND state = ?
            "#,
        )
        .bind(state.as_str())
        .bind(now)
        .bind(reason)
        .bind(queue.as_str())
        .bind(id)
        .bind(STATE_ACTIVE)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let current: Option<String> = sqlx::query_scalar(
            "SELECT state FROM jobs WHERE queue = ? AND id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(queue.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match current {
            None => Err(AppError::NotFound(format!("Job {} not found", id))),
            Some(current) => Err(AppError::Conflict(format!(
                "Cannot finish job {} from {} to {}",
                id, current, state
            ))),
        }
    }
}

async fn set_paused(pool: &SqlitePool, queue: QueueName, paused: bool) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO queues (name, paused) VALUES (?, ?)
        ON CONFLICT (name) DO UPDATE SET paused = excluded.paused
        "#,
    )
    .bind(queue.as_str())
    .bind(paused as i64)
    .execute(pool)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    queue: String,
    name: String,
    data: String,
    state: String,
    priority: i32,
    run_at: i64,
    created_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    failed_reason: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<QueuedJob> {
        Ok(QueuedJob {
            queue: self.queue.parse()?,
            state: self.state.parse()?,
            data: serde_json::from_str(&self.data)?,
            id: self.id,
            name: self.name,
            priority: self.priority,
            created_at: self.created_at,
            run_at: self.run_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            failed_reason: self.failed_reason,
        })
    }
}
