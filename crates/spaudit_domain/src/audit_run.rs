use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spaudit_ids::{AuditRunId, JobId, SiteId};

/// What caused an audit run to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditRunTrigger {
    Manual,
    Scheduled,
}

/// Terminal outcome of an audit run. `None` while the run is still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditRunStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Aggregate metrics recorded on the terminal transition of an `AuditRun`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRunMetrics {
    pub lists_found: u64,
    pub lists_processed: u64,
    pub items_found: u64,
    pub items_processed: u64,
    pub permissions_analyzed: u64,
    pub sharing_links_found: u64,
    pub errors_encountered: u64,
}

/// A single execution of the audit workflow. Created when the workflow
/// starts and never mutated except for `completed_at`/`final_status`/
/// `metrics` on its one terminal transition; its snapshot rows are
/// immutable once terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRun {
    pub audit_run_id: AuditRunId,
    pub job_id: JobId,
    pub site_id: SiteId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub trigger: AuditRunTrigger,
    pub final_status: Option<AuditRunStatus>,
    pub metrics: AuditRunMetrics,
}

impl AuditRun {
    pub fn is_terminal(&self) -> bool {
        self.final_status.is_some()
    }
}
