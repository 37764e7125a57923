//! Tier 1: the global job repository, plus the admission-control query C5
//! relies on.

use chrono::{DateTime, Utc};
use spaudit_db::DbHandles;
use spaudit_domain::{EngineError, Job, JobState, JobStatus};
use spaudit_ids::{JobId, SiteId};
use sqlx::Row;

#[derive(Clone)]
pub struct JobRepository {
    db: DbHandles,
}

impl JobRepository {
    pub fn new(db: DbHandles) -> Self {
        Self { db }
    }

    pub async fn save(&self, job: &Job) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO jobs (job_id, job_type, status, site_url, site_id, item_guid, \
             progress, state_json, started_at, completed_at, result_json, error) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(job_id) DO UPDATE SET \
             status = excluded.status, site_id = excluded.site_id, progress = excluded.progress, \
             state_json = excluded.state_json, started_at = excluded.started_at, \
             completed_at = excluded.completed_at, result_json = excluded.result_json, \
             error = excluded.error",
        )
        .bind(job.job_id.as_str())
        .bind(&job.job_type)
        .bind(status_to_str(job.status))
        .bind(&job.site_url)
        .bind(job.site_id.map(|id| id.get()))
        .bind(&job.item_guid)
        .bind(job.state.progress.percentage)
        .bind(job.state.to_json())
        .bind(job.started_at.map(|t| t.to_rfc3339()))
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .bind(job.result.as_ref().map(|v| v.to_string()))
        .bind(&job.error)
        .execute(&self.db.write_pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, job_id: &JobId) -> Result<Job, EngineError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE job_id = ?")
            .bind(job_id.as_str())
            .fetch_optional(&self.db.read_pool)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
        row_to_job(&row)
    }

    pub async fn list_all(&self) -> Result<Vec<Job>, EngineError> {
        let rows = sqlx::query("SELECT * FROM jobs ORDER BY started_at DESC")
            .fetch_all(&self.db.read_pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    pub async fn list_by_type(&self, job_type: &str) -> Result<Vec<Job>, EngineError> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE job_type = ? ORDER BY started_at DESC")
            .bind(job_type)
            .fetch_all(&self.db.read_pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    pub async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, EngineError> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE status = ? ORDER BY started_at DESC")
            .bind(status_to_str(status))
            .fetch_all(&self.db.read_pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    /// The admission-control read: any non-terminal job for this URL.
    /// Callers must re-check this inside the write transaction that
    /// inserts the new job row, since this call alone cannot close the
    /// race against a concurrent `StartJob`.
    pub async fn find_active_by_site_url(
        &self,
        site_url: &str,
    ) -> Result<Option<Job>, EngineError> {
        let row = sqlx::query(
            "SELECT * FROM jobs WHERE site_url = ? AND status IN ('pending', 'running') \
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(site_url)
        .fetch_optional(&self.db.write_pool)
        .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    /// Prunes terminal jobs. `older_than` is accepted for interface parity
    /// with the original but, matching a known defect upstream, is not
    /// applied — the filter always targets jobs with `completed_at` set at
    /// all, regardless of how long ago. Preserved rather than silently
    /// fixed; callers relying on age-based pruning should not assume it
    /// works yet.
    pub async fn delete_old_jobs(&self, _older_than: DateTime<Utc>) -> Result<u64, EngineError> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status IN ('completed', 'failed', 'cancelled') \
             AND completed_at IS NOT NULL",
        )
        .execute(&self.db.write_pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(raw: &str) -> JobStatus {
    match raw {
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "cancelled" => JobStatus::Cancelled,
        _ => JobStatus::Pending,
    }
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job, EngineError> {
    let job_id_str: String = row.try_get("job_id")?;
    let status_str: String = row.try_get("status")?;
    let state_json: String = row.try_get("state_json")?;
    let started_at: Option<String> = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;
    let result_json: Option<String> = row.try_get("result_json")?;
    let site_id: Option<i64> = row.try_get("site_id")?;

    Ok(Job {
        job_id: JobId::parse(&job_id_str)
            .map_err(|e| EngineError::Fatal(format!("corrupt job_id: {e}")))?,
        job_type: row.try_get("job_type")?,
        status: status_from_str(&status_str),
        site_url: row.try_get("site_url")?,
        site_id: site_id.map(SiteId::new),
        item_guid: row.try_get("item_guid")?,
        state: JobState::from_json(&state_json),
        started_at: started_at
            .as_deref()
            .map(parse_rfc3339)
            .transpose()?,
        completed_at: completed_at
            .as_deref()
            .map(parse_rfc3339)
            .transpose()?,
        result: result_json
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok()),
        error: row.try_get("error")?,
    })
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::Fatal(format!("corrupt timestamp {raw:?}: {e}")))
}
