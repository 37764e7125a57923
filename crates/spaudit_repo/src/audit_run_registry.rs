//! C2: audit-run registry. Assigns monotonically increasing `audit_run_id`
//! per (site, job), records lifecycle events, resolves "latest".

use chrono::{DateTime, Utc};
use spaudit_db::DbHandles;
use spaudit_domain::{AuditRun, AuditRunMetrics, AuditRunStatus, AuditRunTrigger, EngineError};
use spaudit_ids::{AuditRunId, JobId, SiteId};
use sqlx::error::DatabaseError;
use sqlx::Row;

/// A caller-supplied selector for resolving a concrete run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSelector {
    Latest,
    Id(AuditRunId),
}

impl RunSelector {
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        if raw.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        raw.parse::<i64>()
            .map(|id| Self::Id(AuditRunId::new(id)))
            .map_err(|_| EngineError::ValidationError(format!("invalid run selector: {raw}")))
    }
}

#[derive(Clone)]
pub struct AuditRunRegistry {
    db: DbHandles,
}

impl AuditRunRegistry {
    pub fn new(db: DbHandles) -> Self {
        Self { db }
    }

    /// Inserts a new run row with a monotonically increasing id. Fails with
    /// `ValidationError` if a run already exists for this `job_id` — an
    /// `AuditRun` is unique by `job_id`.
    pub async fn create_audit_run(
        &self,
        site_id: SiteId,
        job_id: &JobId,
        started_at: DateTime<Utc>,
        trigger: AuditRunTrigger,
    ) -> Result<AuditRunId, EngineError> {
        let trigger_str = trigger_to_str(trigger);
        let result = sqlx::query(
            "INSERT INTO audit_runs (job_id, site_id, started_at, trigger) VALUES (?, ?, ?, ?)",
        )
        .bind(job_id.as_str())
        .bind(site_id.get())
        .bind(started_at.to_rfc3339())
        .bind(trigger_str)
        .execute(&self.db.write_pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                EngineError::ValidationError(format!(
                    "audit run already exists for job {job_id}"
                ))
            }
            _ => EngineError::from(e),
        })?;

        Ok(AuditRunId::new(result.last_insert_rowid()))
    }

    /// Sets terminal fields. Idempotent calls with the same outcome are
    /// tolerated; calling this on an already-terminal run is a programming
    /// error surfaced as `Fatal` since completed rows must never change.
    pub async fn complete_audit_run(
        &self,
        audit_run_id: AuditRunId,
        completed_at: DateTime<Utc>,
        metrics: AuditRunMetrics,
        final_status: AuditRunStatus,
    ) -> Result<(), EngineError> {
        let result = sqlx::query(
            "UPDATE audit_runs SET completed_at = ?, final_status = ?, lists_found = ?, \
             lists_processed = ?, items_found = ?, items_processed = ?, permissions_analyzed = ?, \
             sharing_links_found = ?, errors_encountered = ? \
             WHERE audit_run_id = ? AND completed_at IS NULL",
        )
        .bind(completed_at.to_rfc3339())
        .bind(status_to_str(final_status))
        .bind(metrics.lists_found as i64)
        .bind(metrics.lists_processed as i64)
        .bind(metrics.items_found as i64)
        .bind(metrics.items_processed as i64)
        .bind(metrics.permissions_analyzed as i64)
        .bind(metrics.sharing_links_found as i64)
        .bind(metrics.errors_encountered as i64)
        .bind(audit_run_id.get())
        .execute(&self.db.write_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::Fatal(format!(
                "audit run {audit_run_id} not found or already terminal"
            )));
        }
        Ok(())
    }

    pub async fn get_audit_run(&self, audit_run_id: AuditRunId) -> Result<AuditRun, EngineError> {
        let row = sqlx::query("SELECT * FROM audit_runs WHERE audit_run_id = ?")
            .bind(audit_run_id.get())
            .fetch_optional(&self.db.read_pool)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("audit run {audit_run_id}")))?;
        row_to_audit_run(&row)
    }

    pub async fn get_latest_audit_run_for_site(
        &self,
        site_id: SiteId,
    ) -> Result<Option<AuditRun>, EngineError> {
        let row = sqlx::query(
            "SELECT * FROM audit_runs WHERE site_id = ? ORDER BY audit_run_id DESC LIMIT 1",
        )
        .bind(site_id.get())
        .fetch_optional(&self.db.read_pool)
        .await?;

        row.as_ref().map(row_to_audit_run).transpose()
    }

    pub async fn list_audit_runs_for_site(
        &self,
        site_id: SiteId,
        limit: u32,
    ) -> Result<Vec<AuditRun>, EngineError> {
        let rows = sqlx::query(
            "SELECT * FROM audit_runs WHERE site_id = ? ORDER BY audit_run_id DESC LIMIT ?",
        )
        .bind(site_id.get())
        .bind(limit as i64)
        .fetch_all(&self.db.read_pool)
        .await?;

        rows.iter().map(row_to_audit_run).collect()
    }

    /// Re-resolves the selector against current state every call — "latest"
    /// is never cached, since newer runs may appear between requests.
    pub async fn resolve_run_selector(
        &self,
        site_id: SiteId,
        selector: RunSelector,
    ) -> Result<AuditRunId, EngineError> {
        match selector {
            RunSelector::Latest => self
                .get_latest_audit_run_for_site(site_id)
                .await?
                .map(|run| run.audit_run_id)
                .ok_or_else(|| EngineError::NotFound(format!("no audit runs for site {site_id}"))),
            RunSelector::Id(id) => {
                let run = self.get_audit_run(id).await?;
                if run.site_id != site_id {
                    return Err(EngineError::NotFound(format!("audit run {id} not found for site {site_id}")));
                }
                Ok(id)
            }
        }
    }
}

fn trigger_to_str(trigger: AuditRunTrigger) -> &'static str {
    match trigger {
        AuditRunTrigger::Manual => "manual",
        AuditRunTrigger::Scheduled => "scheduled",
    }
}

fn trigger_from_str(raw: &str) -> AuditRunTrigger {
    match raw {
        "scheduled" => AuditRunTrigger::Scheduled,
        _ => AuditRunTrigger::Manual,
    }
}

fn status_to_str(status: AuditRunStatus) -> &'static str {
    match status {
        AuditRunStatus::Completed => "completed",
        AuditRunStatus::Failed => "failed",
        AuditRunStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(raw: &str) -> Option<AuditRunStatus> {
    match raw {
        "completed" => Some(AuditRunStatus::Completed),
        "failed" => Some(AuditRunStatus::Failed),
        "cancelled" => Some(AuditRunStatus::Cancelled),
        _ => None,
    }
}

fn row_to_audit_run(row: &sqlx::sqlite::SqliteRow) -> Result<AuditRun, EngineError> {
    let started_at: String = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;
    let job_id_str: String = row.try_get("job_id")?;
    let final_status: Option<String> = row.try_get("final_status")?;
    let trigger_str: String = row.try_get("trigger")?;

    Ok(AuditRun {
        audit_run_id: AuditRunId::new(row.try_get::<i64, _>("audit_run_id")?),
        job_id: JobId::parse(&job_id_str)
            .map_err(|e| EngineError::Fatal(format!("corrupt job_id in audit_runs: {e}")))?,
        site_id: SiteId::new(row.try_get::<i64, _>("site_id")?),
        started_at: parse_rfc3339(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_rfc3339).transpose()?,
        trigger: trigger_from_str(&trigger_str),
        final_status: final_status.as_deref().and_then(status_from_str),
        metrics: AuditRunMetrics {
            lists_found: row.try_get::<i64, _>("lists_found")? as u64,
            lists_processed: row.try_get::<i64, _>("lists_processed")? as u64,
            items_found: row.try_get::<i64, _>("items_found")? as u64,
            items_processed: row.try_get::<i64, _>("items_processed")? as u64,
            permissions_analyzed: row.try_get::<i64, _>("permissions_analyzed")? as u64,
            sharing_links_found: row.try_get::<i64, _>("sharing_links_found")? as u64,
            errors_encountered: row.try_get::<i64, _>("errors_encountered")? as u64,
        },
    })
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::Fatal(format!("corrupt timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spaudit_db::{open, DbConfig};

    async fn registry() -> AuditRunRegistry {
        let db = open(&DbConfig::sqlite_memory()).await.unwrap();
        sqlx::query("INSERT INTO sites (url, title, created_at, updated_at) VALUES ('https://x', 't', datetime('now'), datetime('now'))")
            .execute(&db.write_pool)
            .await
            .unwrap();
        AuditRunRegistry::new(db)
    }

    #[tokio::test]
    async fn create_then_resolve_latest() {
        let reg = registry().await;
        let site = SiteId::new(1);
        let job = JobId::new();
        let run_id = reg
            .create_audit_run(site, &job, Utc::now(), AuditRunTrigger::Manual)
            .await
            .unwrap();

        let resolved = reg.resolve_run_selector(site, RunSelector::Latest).await.unwrap();
        assert_eq!(resolved, run_id);
    }

    #[tokio::test]
    async fn resolve_latest_fails_not_found_when_no_runs() {
        let reg = registry().await;
        let err = reg
            .resolve_run_selector(SiteId::new(1), RunSelector::Latest)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), spaudit_domain::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn latest_orders_by_audit_run_id_descending() {
        let reg = registry().await;
        let site = SiteId::new(1);
        let run1 = reg
            .create_audit_run(site, &JobId::new(), Utc::now(), AuditRunTrigger::Manual)
            .await
            .unwrap();
        let run2 = reg
            .create_audit_run(site, &JobId::new(), Utc::now(), AuditRunTrigger::Manual)
            .await
            .unwrap();
        assert!(run2.get() > run1.get());
        let resolved = reg.resolve_run_selector(site, RunSelector::Latest).await.unwrap();
        assert_eq!(resolved, run2);
    }

    #[tokio::test]
    async fn complete_audit_run_sets_terminal_fields_once() {
        let reg = registry().await;
        let run_id = reg
            .create_audit_run(SiteId::new(1), &JobId::new(), Utc::now(), AuditRunTrigger::Manual)
            .await
            .unwrap();

        reg.complete_audit_run(run_id, Utc::now(), AuditRunMetrics::default(), AuditRunStatus::Completed)
            .await
            .unwrap();

        let run = reg.get_audit_run(run_id).await.unwrap();
        assert!(run.is_terminal());
        assert!(run.completed_at.is_some());

        // Second completion must fail: completed_at is set exactly once.
        let err = reg
            .complete_audit_run(run_id, Utc::now(), AuditRunMetrics::default(), AuditRunStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), spaudit_domain::ErrorKind::Fatal);
    }
}
