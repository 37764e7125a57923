//! C10: scoped service factory. Resolves a caller-supplied run selector
//! (`"latest"` or a concrete id) into a fixed `audit_run_id` once, then
//! hands back repositories bound to that one snapshot — every read through
//! `ScopedServices` sees the same run, even if a newer one completes while
//! the caller is still using it.

use spaudit_db::DbHandles;
use spaudit_domain::EngineError;
use spaudit_ids::{AuditRunId, SiteId};
use spaudit_repo::{AuditRunRegistry, PermissionRepository, RunSelector, ScopedReader, SiteContentRepository};

#[derive(Debug)]
pub struct ScopedServices {
    pub audit_run_id: AuditRunId,
    pub site_content: SiteContentRepository,
    pub permissions: PermissionRepository,
    pub browsing: ScopedReader,
}

#[derive(Clone)]
pub struct ServiceFactory {
    db: DbHandles,
    runs: AuditRunRegistry,
}

impl ServiceFactory {
    pub fn new(db: DbHandles) -> Self {
        Self { runs: AuditRunRegistry::new(db.clone()), db }
    }

    /// Resolves `selector` against `site_id` and returns services bound to
    /// the resolved run. Returns `NotFound` if the site has no matching run
    /// — most commonly, a fresh site with `RunSelector::Latest` and no
    /// completed audit yet.
    pub async fn create_for_audit_run(&self, site_id: SiteId, selector: RunSelector) -> Result<ScopedServices, EngineError> {
        let audit_run_id = self.runs.resolve_run_selector(site_id, selector).await?;
        Ok(ScopedServices {
            audit_run_id,
            site_content: SiteContentRepository::new(self.db.clone()),
            permissions: PermissionRepository::new(self.db.clone()),
            browsing: ScopedReader::new(site_id, audit_run_id, self.db.clone()),
        })
    }
}
