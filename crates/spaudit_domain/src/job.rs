//! Job identity, lifecycle, and the rich `JobState` progress record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spaudit_ids::{JobId, SiteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// The pipeline stage of a `site_audit` job. Stage weights (used to derive
/// overall percentage) live alongside the executor, not here — `JobState`
/// only records which stage is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initialize,
    SiteMetadata,
    ListsEnumeration,
    ListPermissions,
    ItemPermissions,
    SharingAudit,
    Finalize,
}

impl Stage {
    /// Share of total progress this stage contributes, out of 100. Sums to
    /// 100 across all variants.
    pub fn weight(&self) -> f64 {
        match self {
            Stage::Initialize => 2.0,
            Stage::SiteMetadata => 3.0,
            Stage::ListsEnumeration => 10.0,
            Stage::ListPermissions => 30.0,
            Stage::ItemPermissions => 30.0,
            Stage::SharingAudit => 20.0,
            Stage::Finalize => 5.0,
        }
    }

    /// Cumulative weight of every stage strictly before this one — the
    /// percentage floor this stage starts from.
    pub fn base(&self) -> f64 {
        const ORDER: [Stage; 7] = [
            Stage::Initialize,
            Stage::SiteMetadata,
            Stage::ListsEnumeration,
            Stage::ListPermissions,
            Stage::ItemPermissions,
            Stage::SharingAudit,
            Stage::Finalize,
        ];
        ORDER
            .iter()
            .take_while(|s| *s != self)
            .map(Stage::weight)
            .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub percentage: f64,
    pub items_done: u64,
    pub items_total: Option<u64>,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobContext {
    pub site_title: Option<String>,
    pub current_list_title: Option<String>,
    pub current_item_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub stage: Stage,
    pub started: DateTime<Utc>,
    pub completed: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub lists_found: u64,
    pub lists_processed: u64,
    pub items_found: u64,
    pub items_processed: u64,
    pub permissions_analyzed: u64,
    pub sharing_links_found: u64,
    pub errors_encountered: u64,
}

/// Structured progress record, serialized to JSON for durable storage in
/// `jobs.state_json`. Deserialization is schema-tolerant: a parse failure
/// (e.g. an older job row from before a field was added) yields
/// `JobState::default()` rather than propagating an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub stage: Option<Stage>,
    pub stage_started_at: Option<DateTime<Utc>>,
    pub current_operation: Option<String>,
    pub current_item: Option<String>,
    pub progress: Progress,
    pub context: JobContext,
    pub timeline: Vec<TimelineEntry>,
    pub stats: Stats,
    pub messages: Vec<String>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            stage: None,
            stage_started_at: None,
            current_operation: None,
            current_item: None,
            progress: Progress::default(),
            context: JobContext::default(),
            timeline: Vec::new(),
            stats: Stats::default(),
            messages: Vec::new(),
        }
    }
}

impl JobState {
    /// Parses a persisted `state_json` blob, falling back to the default
    /// state on any decode error rather than failing the read.
    pub fn from_json(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Applies a progress update, appending a timeline entry when the stage
    /// changes. `percentage` is derived from the stage's weight and must
    /// never decrease within the same stage (enforced by the caller, which
    /// always derives it from `Stage::base`/`Stage::weight`).
    pub fn update_progress(
        &mut self,
        now: DateTime<Utc>,
        stage: Stage,
        description: impl Into<String>,
        items_done: u64,
        items_total: Option<u64>,
    ) {
        if self.stage != Some(stage) {
            if let Some(prev_stage) = self.stage {
                if let Some(last) = self.timeline.last_mut() {
                    if last.stage == prev_stage && last.completed.is_none() {
                        last.completed = Some(now);
                        last.duration_ms = Some((now - last.started).num_milliseconds());
                    }
                }
            }
            self.timeline.push(TimelineEntry {
                stage,
                started: now,
                completed: None,
                duration_ms: None,
            });
            self.stage = Some(stage);
            self.stage_started_at = Some(now);
        }

        let fraction = match items_total {
            Some(total) if total > 0 => (items_done as f64 / total as f64).min(1.0),
            _ => 0.0,
        };
        self.progress = Progress {
            percentage: stage.base() + stage.weight() * fraction,
            items_done,
            items_total,
            description: description.into(),
        };
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }
}

/// Per-job overrides for workflow tuning, mirroring the form keys a start
/// request carries (`batch_size`, `max_retries`, `retry_delay`, `timeout`,
/// `scan_individual_items`, `skip_hidden`, `include_sharing`). Every field
/// is optional; an absent field means "use the executor's configured
/// default" rather than forcing a specific value. Not persisted on `Job` —
/// it's a one-shot argument to `StartJob`, not part of job identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    pub batch_size: Option<u32>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub scan_individual_items: Option<bool>,
    pub skip_hidden: Option<bool>,
    pub include_sharing: Option<bool>,
}

/// A unit of asynchronous work. Identity (`job_id`, `job_type`, `site_url`)
/// is immutable; everything else mutates until the job reaches a terminal
/// status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub job_type: String,
    pub status: JobStatus,
    pub site_url: String,
    pub site_id: Option<SiteId>,
    pub item_guid: Option<String>,
    pub state: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(job_type: impl Into<String>, site_url: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            job_type: job_type.into(),
            status: JobStatus::Pending,
            site_url: site_url.into(),
            site_id: None,
            item_guid: None,
            state: JobState::default(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_weights_sum_to_100() {
        let stages = [
            Stage::Initialize,
            Stage::SiteMetadata,
            Stage::ListsEnumeration,
            Stage::ListPermissions,
            Stage::ItemPermissions,
            Stage::SharingAudit,
            Stage::Finalize,
        ];
        let total: f64 = stages.iter().map(Stage::weight).sum();
        assert!((total - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn update_progress_is_monotonic_within_a_stage() {
        let mut state = JobState::default();
        let t0 = Utc::now();
        state.update_progress(t0, Stage::ListPermissions, "start", 0, Some(10));
        let first = state.progress.percentage;
        state.update_progress(t0, Stage::ListPermissions, "more", 5, Some(10));
        let second = state.progress.percentage;
        assert!(second >= first);
    }

    #[test]
    fn stage_change_closes_previous_timeline_entry() {
        let mut state = JobState::default();
        let t0 = Utc::now();
        state.update_progress(t0, Stage::Initialize, "go", 0, None);
        let t1 = t0 + chrono::Duration::seconds(1);
        state.update_progress(t1, Stage::SiteMetadata, "go", 0, None);
        assert_eq!(state.timeline.len(), 2);
        assert!(state.timeline[0].completed.is_some());
        assert!(state.timeline[1].completed.is_none());
    }

    #[test]
    fn malformed_state_json_decodes_to_default() {
        let state = JobState::from_json("{not valid json");
        assert_eq!(state, JobState::default());
    }
}
