//! SQLite-backed job store.
//!
//! One `generations` table, indexed by status (recovery scans) and by
//! `created_at DESC` (newest-first listing). SQLite serializes writers, so
//! polling tasks never need a cross-job lock.
//!
//! `created_at` is stored as fixed-width RFC 3339 text (microseconds, `Z`), so
//! lexicographic order equals chronological order.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use tracing::{debug, instrument};

use vidgen_core::{
    GenerationParams, Job, JobId, JobOutcome, JobStatus, NewJob, RequestId, SourceImage,
};

use super::store::{CountCache, JobPage, JobStore, JobStoreError, Page};

const JOB_COLUMNS: &str = r#"
    id,
    request_id,
    prompt,
    source_image IS NOT NULL AS has_source_image,
    duration,
    aspect_ratio,
    resolution,
    status,
    video_filename,
    error_message,
    created_at
"#;

/// SQLite job store with a short-lived total-count cache.
#[derive(Debug)]
pub struct SqliteJobStore {
    pool: SqlitePool,
    count_cache: CountCache,
}

impl SqliteJobStore {
    /// Open (creating if needed) the database file and ensure the schema.
    pub async fn connect(path: &Path, count_cache_ttl: Duration) -> Result<Self, JobStoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Self::from_pool(pool, count_cache_ttl).await
    }

    /// Private in-memory database (tests/dev). A single connection keeps the
    /// database alive for the lifetime of the pool.
    pub async fn in_memory(count_cache_ttl: Duration) -> Result<Self, JobStoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| map_sqlx_error("connect", e))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Self::from_pool(pool, count_cache_ttl).await
    }

    async fn from_pool(pool: SqlitePool, count_cache_ttl: Duration) -> Result<Self, JobStoreError> {
        migrate(&pool).await?;
        Ok(Self {
            pool,
            count_cache: CountCache::new(count_cache_ttl),
        })
    }

    async fn total_count(&self) -> Result<u64, JobStoreError> {
        let (cached, generation) = self.count_cache.lookup();
        if let Some(total) = cached {
            return Ok(total);
        }

        let row = sqlx::query("SELECT COUNT(*) AS total FROM generations")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_generations", e))?;
        let total: i64 = row
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_generations", e))?;
        let total = total.max(0) as u64;

        self.count_cache.store(generation, total);
        Ok(total)
    }
}

async fn migrate(pool: &SqlitePool) -> Result<(), JobStoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generations (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id     TEXT UNIQUE NOT NULL,
            prompt         TEXT NOT NULL,
            source_image   TEXT,
            duration       INTEGER NOT NULL,
            aspect_ratio   TEXT NOT NULL,
            resolution     TEXT NOT NULL,
            status         TEXT NOT NULL DEFAULT 'pending',
            video_filename TEXT,
            error_message  TEXT,
            created_at     TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("create_table", e))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_generations_status ON generations (status)")
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("create_status_index", e))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_generations_created_at ON generations (created_at DESC)",
    )
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("create_created_at_index", e))?;

    Ok(())
}

#[async_trait]
impl JobStore for SqliteJobStore {
    #[instrument(skip(self, job), fields(request_id = %request_id), err)]
    async fn create(&self, job: &NewJob, request_id: &RequestId) -> Result<JobId, JobStoreError> {
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let result = sqlx::query(
            r#"
            INSERT INTO generations (
                request_id,
                prompt,
                source_image,
                duration,
                aspect_ratio,
                resolution,
                status,
                created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(request_id.as_str())
        .bind(&job.prompt)
        .bind(job.source_image.as_ref().map(SourceImage::as_str))
        .bind(i64::from(job.params.duration.secs()))
        .bind(job.params.aspect_ratio.as_str())
        .bind(job.params.resolution.as_str())
        .bind(JobStatus::Pending.as_str())
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::Conflict(request_id.clone())
            } else {
                map_sqlx_error("insert_generation", e)
            }
        })?;

        self.count_cache.invalidate();

        let id = JobId::new(result.last_insert_rowid());
        debug!(job_id = %id, "generation row inserted");
        Ok(id)
    }

    #[instrument(skip(self, outcome), fields(request_id = %request_id, status = %outcome.status()), err)]
    async fn transition(
        &self,
        request_id: &RequestId,
        outcome: &JobOutcome,
    ) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE generations
            SET status = ?1, video_filename = ?2, error_message = ?3
            WHERE request_id = ?4 AND status = ?5
            "#,
        )
        .bind(outcome.status().as_str())
        .bind(outcome.video_filename())
        .bind(outcome.error_message())
        .bind(request_id.as_str())
        .bind(JobStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_status", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let existing = sqlx::query("SELECT status FROM generations WHERE request_id = ?1")
            .bind(request_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_status", e))?;

        match existing {
            None => Err(JobStoreError::NotFound(request_id.clone())),
            Some(row) => {
                let raw: String = row
                    .try_get("status")
                    .map_err(|e| map_sqlx_error("load_status", e))?;
                let status = JobStatus::from_str(&raw)
                    .map_err(|e| JobStoreError::Corrupt(e.to_string()))?;
                Err(JobStoreError::AlreadyTerminal {
                    request_id: request_id.clone(),
                    status,
                })
            }
        }
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM generations WHERE id = ?1"))
            .bind(job_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_generation", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list(&self, page: Page) -> Result<JobPage, JobStoreError> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = page.limit.map(i64::from).unwrap_or(-1);

        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM generations
            ORDER BY created_at DESC, id DESC
            LIMIT ?1 OFFSET ?2
            "#
        ))
        .bind(limit)
        .bind(i64::from(page.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_generations", e))?;

        let items = rows.iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?;
        let total = self.total_count().await?;

        Ok(JobPage { items, total })
    }

    #[instrument(skip(self), err)]
    async fn list_pending(&self) -> Result<Vec<RequestId>, JobStoreError> {
        let rows = sqlx::query("SELECT request_id FROM generations WHERE status = ?1 ORDER BY id")
            .bind(JobStatus::Pending.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_pending", e))?;

        rows.iter()
            .map(|row| {
                let raw: String = row
                    .try_get("request_id")
                    .map_err(|e| map_sqlx_error("list_pending", e))?;
                RequestId::parse(raw).map_err(|e| JobStoreError::Corrupt(e.to_string()))
            })
            .collect()
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn get_source_image(&self, job_id: JobId) -> Result<Option<SourceImage>, JobStoreError> {
        let row = sqlx::query("SELECT source_image FROM generations WHERE id = ?1")
            .bind(job_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_source_image", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: Option<String> = row
            .try_get("source_image")
            .map_err(|e| map_sqlx_error("get_source_image", e))?;

        raw.map(|r| SourceImage::new(r).map_err(|e| JobStoreError::Corrupt(e.to_string())))
            .transpose()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn job_from_row(row: &SqliteRow) -> Result<Job, JobStoreError> {
    let get_err = |e: sqlx::Error| JobStoreError::Corrupt(format!("failed to decode generation row: {e}"));
    let corrupt = |e: vidgen_core::DomainError| JobStoreError::Corrupt(e.to_string());

    let id: i64 = row.try_get("id").map_err(get_err)?;
    let request_id: String = row.try_get("request_id").map_err(get_err)?;
    let prompt: String = row.try_get("prompt").map_err(get_err)?;
    let has_source_image: i64 = row.try_get("has_source_image").map_err(get_err)?;
    let duration: i64 = row.try_get("duration").map_err(get_err)?;
    let aspect_ratio: String = row.try_get("aspect_ratio").map_err(get_err)?;
    let resolution: String = row.try_get("resolution").map_err(get_err)?;
    let status: String = row.try_get("status").map_err(get_err)?;
    let video_filename: Option<String> = row.try_get("video_filename").map_err(get_err)?;
    let error_message: Option<String> = row.try_get("error_message").map_err(get_err)?;
    let created_at: String = row.try_get("created_at").map_err(get_err)?;

    let status = JobStatus::from_str(&status).map_err(corrupt)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| JobStoreError::Corrupt(format!("invalid created_at: {e}")))?;

    Ok(Job {
        id: JobId::new(id),
        request_id: RequestId::parse(request_id).map_err(corrupt)?,
        prompt,
        has_source_image: has_source_image != 0,
        params: GenerationParams::parse(duration, &aspect_ratio, &resolution).map_err(corrupt)?,
        outcome: JobOutcome::from_columns(status, video_filename, error_message).map_err(corrupt)?,
        created_at,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            JobStoreError::Storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        other => JobStoreError::Storage(format!("{operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
