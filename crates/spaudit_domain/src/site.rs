use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spaudit_ids::SiteId;

/// A SharePoint site, identified by URL. Global — not run-versioned, and
/// outlives every `AuditRun` performed against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub site_id: SiteId,
    pub url: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
