//! Tier 2: scoped interfaces bound to a fixed `(site_id, audit_run_id)`.
//!
//! Two distinct types rather than one interface with `NotSupported`
//! write methods: `ScopedReader` can only read, and the only legal writer,
//! `SharePointAuditRepository`, is never handed to request-scoped read
//! paths. Misuse is a compile error, not a runtime one.

use crate::entity_repo::{
    ItemRepository, ListRepository, PrincipalRepository, RoleRepository, SharingRepository,
    WebRepository,
};
use crate::site_repo::SiteRepository;
use spaudit_db::DbHandles;
use spaudit_domain::{
    EngineError, Item, List, ObjectType, Principal, RoleAssignment, RoleDefinition, SharingLink,
    SharingLinkMember, Web,
};
use spaudit_ids::{AuditRunId, SiteId};

/// Read-only view bound to one snapshot. Every method either takes no
/// site id (the scope supplies it implicitly) or validates a
/// caller-provided one against the bound scope, returning
/// `SiteScopeMismatch` on mismatch.
#[derive(Clone)]
pub struct ScopedReader {
    site_id: SiteId,
    audit_run_id: AuditRunId,
    webs: WebRepository,
    lists: ListRepository,
    items: ItemRepository,
    principals: PrincipalRepository,
    roles: RoleRepository,
    sharing: SharingRepository,
}

impl ScopedReader {
    pub fn new(site_id: SiteId, audit_run_id: AuditRunId, db: DbHandles) -> Self {
        Self {
            site_id,
            audit_run_id,
            webs: WebRepository::new(db.clone()),
            lists: ListRepository::new(db.clone()),
            items: ItemRepository::new(db.clone()),
            principals: PrincipalRepository::new(db.clone()),
            roles: RoleRepository::new(db.clone()),
            sharing: SharingRepository::new(db),
        }
    }

    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    pub fn audit_run_id(&self) -> AuditRunId {
        self.audit_run_id
    }

    fn check_scope(&self, caller_site_id: SiteId) -> Result<(), EngineError> {
        if caller_site_id != self.site_id {
            return Err(EngineError::SiteScopeMismatch {
                expected: self.site_id.get(),
                actual: caller_site_id.get(),
            });
        }
        Ok(())
    }

    pub async fn list_webs(&self) -> Result<Vec<Web>, EngineError> {
        self.webs.list_for_run(self.site_id, self.audit_run_id).await
    }

    pub async fn list_lists(&self) -> Result<Vec<List>, EngineError> {
        self.lists.list_for_run(self.site_id, self.audit_run_id).await
    }

    pub async fn get_list(&self, caller_site_id: SiteId, list_id: &str) -> Result<Option<List>, EngineError> {
        self.check_scope(caller_site_id)?;
        self.lists.get(self.site_id, self.audit_run_id, list_id).await
    }

    pub async fn list_items(&self, list_id: &str) -> Result<Vec<Item>, EngineError> {
        self.items.list_for_list(self.site_id, self.audit_run_id, list_id).await
    }

    pub async fn get_item(&self, caller_site_id: SiteId, item_guid: &str) -> Result<Option<Item>, EngineError> {
        self.check_scope(caller_site_id)?;
        self.items.get_by_guid(self.site_id, self.audit_run_id, item_guid).await
    }

    pub async fn get_principal(&self, principal_id: &str) -> Result<Option<Principal>, EngineError> {
        self.principals.get(self.site_id, self.audit_run_id, principal_id).await
    }

    pub async fn assignments_for_object(
        &self,
        object_type: ObjectType,
        object_key: &str,
    ) -> Result<Vec<RoleAssignment>, EngineError> {
        self.roles
            .assignments_for_object(self.site_id, self.audit_run_id, object_type, object_key)
            .await
    }

    pub async fn root_assignments_for_principal(&self, principal_id: &str) -> Result<Vec<RoleAssignment>, EngineError> {
        self.roles
            .root_assignments_for_principal(self.site_id, self.audit_run_id, principal_id)
            .await
    }

    pub async fn links_for_item(&self, item_guid: &str) -> Result<Vec<SharingLink>, EngineError> {
        self.sharing.links_for_item(self.site_id, self.audit_run_id, item_guid).await
    }
}

/// The only legal writer for snapshot rows. Scoped to a fixed
/// `audit_run_id`; `site_id` is threaded through each call rather than
/// cached on the struct, since early workflow stages operate under a
/// placeholder id (`SiteId(0)`) until the real one is resolved, and the
/// real id must never be adopted via interior mutation shared across
/// concurrent jobs.
#[derive(Clone)]
pub struct SharePointAuditRepository {
    audit_run_id: AuditRunId,
    sites: SiteRepository,
    webs: WebRepository,
    lists: ListRepository,
    items: ItemRepository,
    principals: PrincipalRepository,
    roles: RoleRepository,
    sharing: SharingRepository,
}

impl SharePointAuditRepository {
    pub fn new(audit_run_id: AuditRunId, db: DbHandles) -> Self {
        Self {
            audit_run_id,
            sites: SiteRepository::new(db.clone()),
            webs: WebRepository::new(db.clone()),
            lists: ListRepository::new(db.clone()),
            items: ItemRepository::new(db.clone()),
            principals: PrincipalRepository::new(db.clone()),
            roles: RoleRepository::new(db.clone()),
            sharing: SharingRepository::new(db),
        }
    }

    pub fn audit_run_id(&self) -> AuditRunId {
        self.audit_run_id
    }

    /// Upserts the site by URL. Tolerant of a placeholder call with an
    /// empty title during `initialize`; the caller threads the returned id
    /// forward as `site_id` on every subsequent call below.
    pub async fn upsert_site(&self, url: &str, title: &str) -> Result<SiteId, EngineError> {
        self.sites.upsert_site(url, title).await
    }

    pub async fn upsert_web(&self, site_id: SiteId, mut web: Web) -> Result<(), EngineError> {
        web.site_id = site_id;
        web.audit_run_id = self.audit_run_id;
        self.webs.upsert(site_id, self.audit_run_id, &web).await
    }

    pub async fn upsert_list(&self, site_id: SiteId, mut list: List) -> Result<(), EngineError> {
        list.site_id = site_id;
        list.audit_run_id = self.audit_run_id;
        self.lists.upsert(site_id, self.audit_run_id, &list).await
    }

    pub async fn upsert_item(&self, site_id: SiteId, mut item: Item) -> Result<(), EngineError> {
        item.site_id = site_id;
        item.audit_run_id = self.audit_run_id;
        self.items.upsert(site_id, self.audit_run_id, &item).await
    }

    pub async fn upsert_principal(&self, site_id: SiteId, mut principal: Principal) -> Result<(), EngineError> {
        principal.site_id = site_id;
        principal.audit_run_id = self.audit_run_id;
        self.principals.upsert(site_id, self.audit_run_id, &principal).await
    }

    pub async fn upsert_role_definition(&self, site_id: SiteId, mut def: RoleDefinition) -> Result<(), EngineError> {
        def.site_id = site_id;
        def.audit_run_id = self.audit_run_id;
        self.roles.upsert_definition(site_id, self.audit_run_id, &def).await
    }

    pub async fn upsert_role_assignment(&self, site_id: SiteId, mut assignment: RoleAssignment) -> Result<(), EngineError> {
        assignment.site_id = site_id;
        assignment.audit_run_id = self.audit_run_id;
        self.roles.upsert_assignment(site_id, self.audit_run_id, &assignment).await
    }

    pub async fn upsert_sharing_link(&self, site_id: SiteId, mut link: SharingLink) -> Result<(), EngineError> {
        link.site_id = site_id;
        link.audit_run_id = self.audit_run_id;
        self.sharing.upsert_link(site_id, self.audit_run_id, &link).await
    }

    pub async fn upsert_sharing_link_member(&self, site_id: SiteId, mut member: SharingLinkMember) -> Result<(), EngineError> {
        member.site_id = site_id;
        member.audit_run_id = self.audit_run_id;
        self.sharing.upsert_member(site_id, self.audit_run_id, &member).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spaudit_db::{open, DbConfig};
    use spaudit_domain::PrincipalKind;
    use spaudit_ids::JobId;

    async fn seeded_run() -> (DbHandles, SiteId, AuditRunId) {
        let db = open(&DbConfig::sqlite_memory()).await.unwrap();
        let site_repo = SiteRepository::new(db.clone());
        let site_id = site_repo.upsert_site("https://t/s/A", "A").await.unwrap();
        sqlx::query("INSERT INTO audit_runs (job_id, site_id, started_at, trigger) VALUES (?, ?, datetime('now'), 'manual')")
            .bind(JobId::new().as_str())
            .bind(site_id.get())
            .execute(&db.write_pool)
            .await
            .unwrap();
        (db, site_id, AuditRunId::new(1))
    }

    #[tokio::test]
    async fn writer_stamps_site_id_on_nested_principal() {
        let (db, site_id, run_id) = seeded_run().await;
        let writer = SharePointAuditRepository::new(run_id, db.clone());

        writer
            .upsert_principal(
                site_id,
                Principal {
                    site_id: SiteId::new(0),
                    audit_run_id: AuditRunId::new(0),
                    principal_id: "p1".into(),
                    kind: PrincipalKind::User,
                    title: "Alice".into(),
                    login_name: "alice@example.com".into(),
                    email: "alice@example.com".into(),
                },
            )
            .await
            .unwrap();

        let reader = ScopedReader::new(site_id, run_id, db);
        let principal = reader.get_principal("p1").await.unwrap().unwrap();
        assert_eq!(principal.site_id, site_id);
        assert_eq!(principal.audit_run_id, run_id);
    }

    #[tokio::test]
    async fn reader_rejects_cross_scope_call() {
        let (db, site_id, run_id) = seeded_run().await;
        let reader = ScopedReader::new(site_id, run_id, db);
        let other_site = SiteId::new(site_id.get() + 1);
        let err = reader.get_list(other_site, "some-list").await.unwrap_err();
        assert_eq!(err.kind(), spaudit_domain::ErrorKind::SiteScopeMismatch);
    }
}
