//! Tier 1: unscoped entity repositories, one per aggregate. Every write
//! accepts an explicit `(site_id, audit_run_id)`; every read is either
//! global or takes explicit site+run ids.

use spaudit_db::DbHandles;
use spaudit_domain::{
    EngineError, Item, List, ObjectType, Principal, PrincipalKind, RoleAssignment,
    RoleDefinition, SharingLink, SharingLinkFlags, SharingLinkGovernance, SharingLinkKind,
    SharingLinkMember, SharingLinkScope, Web,
};
use spaudit_ids::{AuditRunId, SiteId};
use sqlx::Row;

#[derive(Clone)]
pub struct WebRepository {
    db: DbHandles,
}

impl WebRepository {
    pub fn new(db: DbHandles) -> Self {
        Self { db }
    }

    pub async fn upsert(&self, site_id: SiteId, audit_run_id: AuditRunId, web: &Web) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO webs (site_id, web_id, audit_run_id, url, title, template, has_unique) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(site_id, web_id, audit_run_id) DO UPDATE SET \
             url = excluded.url, title = excluded.title, template = excluded.template, has_unique = excluded.has_unique",
        )
        .bind(site_id.get())
        .bind(&web.web_id)
        .bind(audit_run_id.get())
        .bind(&web.url)
        .bind(&web.title)
        .bind(&web.template)
        .bind(web.has_unique)
        .execute(&self.db.write_pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_run(&self, site_id: SiteId, audit_run_id: AuditRunId) -> Result<Vec<Web>, EngineError> {
        let rows = sqlx::query("SELECT * FROM webs WHERE site_id = ? AND audit_run_id = ? ORDER BY web_id")
            .bind(site_id.get())
            .bind(audit_run_id.get())
            .fetch_all(&self.db.read_pool)
            .await?;
        rows.iter().map(row_to_web).collect()
    }
}

pub(crate) fn row_to_web(row: &sqlx::sqlite::SqliteRow) -> Result<Web, EngineError> {
    Ok(Web {
        site_id: SiteId::new(row.try_get::<i64, _>("site_id")?),
        audit_run_id: AuditRunId::new(row.try_get::<i64, _>("audit_run_id")?),
        web_id: row.try_get("web_id")?,
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        template: row.try_get("template")?,
        has_unique: row.try_get("has_unique")?,
    })
}

#[derive(Clone)]
pub struct ListRepository {
    db: DbHandles,
}

impl ListRepository {
    pub fn new(db: DbHandles) -> Self {
        Self { db }
    }

    pub async fn upsert(&self, site_id: SiteId, audit_run_id: AuditRunId, list: &List) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO lists (site_id, list_id, audit_run_id, web_id, title, url, base_template, item_count, has_unique, hidden) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(site_id, list_id, audit_run_id) DO UPDATE SET \
             web_id = excluded.web_id, title = excluded.title, url = excluded.url, \
             base_template = excluded.base_template, item_count = excluded.item_count, has_unique = excluded.has_unique, \
             hidden = excluded.hidden",
        )
        .bind(site_id.get())
        .bind(&list.list_id)
        .bind(audit_run_id.get())
        .bind(&list.web_id)
        .bind(&list.title)
        .bind(&list.url)
        .bind(&list.base_template)
        .bind(list.item_count as i64)
        .bind(list.has_unique)
        .bind(list.hidden)
        .execute(&self.db.write_pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_run(&self, site_id: SiteId, audit_run_id: AuditRunId) -> Result<Vec<List>, EngineError> {
        let rows = sqlx::query("SELECT * FROM lists WHERE site_id = ? AND audit_run_id = ? ORDER BY list_id")
            .bind(site_id.get())
            .bind(audit_run_id.get())
            .fetch_all(&self.db.read_pool)
            .await?;
        rows.iter().map(row_to_list).collect()
    }

    pub async fn get(&self, site_id: SiteId, audit_run_id: AuditRunId, list_id: &str) -> Result<Option<List>, EngineError> {
        let row = sqlx::query("SELECT * FROM lists WHERE site_id = ? AND audit_run_id = ? AND list_id = ?")
            .bind(site_id.get())
            .bind(audit_run_id.get())
            .bind(list_id)
            .fetch_optional(&self.db.read_pool)
            .await?;
        row.as_ref().map(row_to_list).transpose()
    }
}

pub(crate) fn row_to_list(row: &sqlx::sqlite::SqliteRow) -> Result<List, EngineError> {
    Ok(List {
        site_id: SiteId::new(row.try_get::<i64, _>("site_id")?),
        audit_run_id: AuditRunId::new(row.try_get::<i64, _>("audit_run_id")?),
        list_id: row.try_get("list_id")?,
        web_id: row.try_get("web_id")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        base_template: row.try_get("base_template")?,
        item_count: row.try_get::<i64, _>("item_count")? as u64,
        has_unique: row.try_get("has_unique")?,
        hidden: row.try_get("hidden")?,
    })
}

#[derive(Clone)]
pub struct ItemRepository {
    db: DbHandles,
}

impl ItemRepository {
    pub fn new(db: DbHandles) -> Self {
        Self { db }
    }

    pub async fn upsert(&self, site_id: SiteId, audit_run_id: AuditRunId, item: &Item) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO items (site_id, item_guid, audit_run_id, list_id, item_id, list_item_guid, \
             name, url, is_file, is_folder, has_unique) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(site_id, item_guid, audit_run_id) DO UPDATE SET \
             list_id = excluded.list_id, item_id = excluded.item_id, list_item_guid = excluded.list_item_guid, \
             name = excluded.name, url = excluded.url, is_file = excluded.is_file, \
             is_folder = excluded.is_folder, has_unique = excluded.has_unique",
        )
        .bind(site_id.get())
        .bind(&item.item_guid)
        .bind(audit_run_id.get())
        .bind(&item.list_id)
        .bind(item.item_id as i64)
        .bind(&item.list_item_guid)
        .bind(&item.name)
        .bind(&item.url)
        .bind(item.is_file)
        .bind(item.is_folder)
        .bind(item.has_unique)
        .execute(&self.db.write_pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_list(&self, site_id: SiteId, audit_run_id: AuditRunId, list_id: &str) -> Result<Vec<Item>, EngineError> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE site_id = ? AND audit_run_id = ? AND list_id = ? ORDER BY item_id",
        )
        .bind(site_id.get())
        .bind(audit_run_id.get())
        .bind(list_id)
        .fetch_all(&self.db.read_pool)
        .await?;
        rows.iter().map(row_to_item).collect()
    }

    pub async fn get_by_guid(&self, site_id: SiteId, audit_run_id: AuditRunId, item_guid: &str) -> Result<Option<Item>, EngineError> {
        let row = sqlx::query("SELECT * FROM items WHERE site_id = ? AND audit_run_id = ? AND item_guid = ?")
            .bind(site_id.get())
            .bind(audit_run_id.get())
            .bind(item_guid)
            .fetch_optional(&self.db.read_pool)
            .await?;
        row.as_ref().map(row_to_item).transpose()
    }
}

pub(crate) fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<Item, EngineError> {
    Ok(Item {
        site_id: SiteId::new(row.try_get::<i64, _>("site_id")?),
        audit_run_id: AuditRunId::new(row.try_get::<i64, _>("audit_run_id")?),
        item_guid: row.try_get("item_guid")?,
        list_id: row.try_get("list_id")?,
        item_id: row.try_get::<i64, _>("item_id")? as u64,
        list_item_guid: row.try_get("list_item_guid")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        is_file: row.try_get("is_file")?,
        is_folder: row.try_get("is_folder")?,
        has_unique: row.try_get("has_unique")?,
    })
}

#[derive(Clone)]
pub struct PrincipalRepository {
    db: DbHandles,
}

impl PrincipalRepository {
    pub fn new(db: DbHandles) -> Self {
        Self { db }
    }

    /// Upserts once per run: a principal seen again in the same run through
    /// a different object resolves to the same row.
    pub async fn upsert(&self, site_id: SiteId, audit_run_id: AuditRunId, principal: &Principal) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO principals (site_id, principal_id, audit_run_id, kind, title, login_name, email) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(site_id, principal_id, audit_run_id) DO UPDATE SET \
             kind = excluded.kind, title = excluded.title, login_name = excluded.login_name, email = excluded.email",
        )
        .bind(site_id.get())
        .bind(&principal.principal_id)
        .bind(audit_run_id.get())
        .bind(kind_to_str(principal.kind))
        .bind(&principal.title)
        .bind(&principal.login_name)
        .bind(&principal.email)
        .execute(&self.db.write_pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, site_id: SiteId, audit_run_id: AuditRunId, principal_id: &str) -> Result<Option<Principal>, EngineError> {
        let row = sqlx::query("SELECT * FROM principals WHERE site_id = ? AND audit_run_id = ? AND principal_id = ?")
            .bind(site_id.get())
            .bind(audit_run_id.get())
            .bind(principal_id)
            .fetch_optional(&self.db.read_pool)
            .await?;
        row.as_ref().map(row_to_principal).transpose()
    }
}

fn kind_to_str(kind: PrincipalKind) -> &'static str {
    match kind {
        PrincipalKind::User => "user",
        PrincipalKind::Distribution => "distribution",
        PrincipalKind::SecurityGroup => "security_group",
        PrincipalKind::SpGroup => "sp_group",
    }
}

fn kind_from_str(raw: &str) -> PrincipalKind {
    match raw {
        "distribution" => PrincipalKind::Distribution,
        "security_group" => PrincipalKind::SecurityGroup,
        "sp_group" => PrincipalKind::SpGroup,
        _ => PrincipalKind::User,
    }
}

pub(crate) fn row_to_principal(row: &sqlx::sqlite::SqliteRow) -> Result<Principal, EngineError> {
    let kind: String = row.try_get("kind")?;
    Ok(Principal {
        site_id: SiteId::new(row.try_get::<i64, _>("site_id")?),
        audit_run_id: AuditRunId::new(row.try_get::<i64, _>("audit_run_id")?),
        principal_id: row.try_get("principal_id")?,
        kind: kind_from_str(&kind),
        title: row.try_get("title")?,
        login_name: row.try_get("login_name")?,
        email: row.try_get("email")?,
    })
}

#[derive(Clone)]
pub struct RoleRepository {
    db: DbHandles,
}

impl RoleRepository {
    pub fn new(db: DbHandles) -> Self {
        Self { db }
    }

    pub async fn upsert_definition(&self, site_id: SiteId, audit_run_id: AuditRunId, def: &RoleDefinition) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO role_definitions (site_id, role_def_id, audit_run_id, name, description) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(site_id, role_def_id, audit_run_id) DO UPDATE SET \
             name = excluded.name, description = excluded.description",
        )
        .bind(site_id.get())
        .bind(&def.role_def_id)
        .bind(audit_run_id.get())
        .bind(&def.name)
        .bind(&def.description)
        .execute(&self.db.write_pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_assignment(&self, site_id: SiteId, audit_run_id: AuditRunId, assignment: &RoleAssignment) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO role_assignments (site_id, object_type, object_key, principal_id, role_def_id, audit_run_id, inherited) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(site_id, object_type, object_key, principal_id, role_def_id, audit_run_id) \
             DO UPDATE SET inherited = excluded.inherited",
        )
        .bind(site_id.get())
        .bind(object_type_to_str(assignment.object_type))
        .bind(&assignment.object_key)
        .bind(&assignment.principal_id)
        .bind(&assignment.role_def_id)
        .bind(audit_run_id.get())
        .bind(assignment.inherited)
        .execute(&self.db.write_pool)
        .await?;
        Ok(())
    }

    pub async fn assignments_for_object(
        &self,
        site_id: SiteId,
        audit_run_id: AuditRunId,
        object_type: ObjectType,
        object_key: &str,
    ) -> Result<Vec<RoleAssignment>, EngineError> {
        let rows = sqlx::query(
            "SELECT * FROM role_assignments WHERE site_id = ? AND audit_run_id = ? AND object_type = ? AND object_key = ?",
        )
        .bind(site_id.get())
        .bind(audit_run_id.get())
        .bind(object_type_to_str(object_type))
        .bind(object_key)
        .fetch_all(&self.db.read_pool)
        .await?;
        rows.iter().map(row_to_assignment).collect()
    }

    /// Every root (non-inherited) assignment for this principal anywhere in
    /// the run — the lookup C9's `SAME_WEB_INHERITANCE` cause needs, scoped
    /// further to one web by the caller.
    pub async fn root_assignments_for_principal(
        &self,
        site_id: SiteId,
        audit_run_id: AuditRunId,
        principal_id: &str,
    ) -> Result<Vec<RoleAssignment>, EngineError> {
        let rows = sqlx::query(
            "SELECT * FROM role_assignments WHERE site_id = ? AND audit_run_id = ? AND principal_id = ? AND inherited = 0",
        )
        .bind(site_id.get())
        .bind(audit_run_id.get())
        .bind(principal_id)
        .fetch_all(&self.db.read_pool)
        .await?;
        rows.iter().map(row_to_assignment).collect()
    }

    pub async fn get_definition(
        &self,
        site_id: SiteId,
        audit_run_id: AuditRunId,
        role_def_id: &str,
    ) -> Result<Option<RoleDefinition>, EngineError> {
        let row = sqlx::query(
            "SELECT * FROM role_definitions WHERE site_id = ? AND audit_run_id = ? AND role_def_id = ?",
        )
        .bind(site_id.get())
        .bind(audit_run_id.get())
        .bind(role_def_id)
        .fetch_optional(&self.db.read_pool)
        .await?;
        row.as_ref().map(row_to_role_definition).transpose()
    }
}

pub(crate) fn row_to_role_definition(row: &sqlx::sqlite::SqliteRow) -> Result<RoleDefinition, EngineError> {
    Ok(RoleDefinition {
        site_id: SiteId::new(row.try_get::<i64, _>("site_id")?),
        audit_run_id: AuditRunId::new(row.try_get::<i64, _>("audit_run_id")?),
        role_def_id: row.try_get("role_def_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

pub fn object_type_to_str(ty: ObjectType) -> &'static str {
    match ty {
        ObjectType::Web => "web",
        ObjectType::List => "list",
        ObjectType::Item => "item",
    }
}

fn object_type_from_str(raw: &str) -> ObjectType {
    match raw {
        "list" => ObjectType::List,
        "item" => ObjectType::Item,
        _ => ObjectType::Web,
    }
}

pub(crate) fn row_to_assignment(row: &sqlx::sqlite::SqliteRow) -> Result<RoleAssignment, EngineError> {
    let object_type: String = row.try_get("object_type")?;
    Ok(RoleAssignment {
        site_id: SiteId::new(row.try_get::<i64, _>("site_id")?),
        audit_run_id: AuditRunId::new(row.try_get::<i64, _>("audit_run_id")?),
        object_type: object_type_from_str(&object_type),
        object_key: row.try_get("object_key")?,
        principal_id: row.try_get("principal_id")?,
        role_def_id: row.try_get("role_def_id")?,
        inherited: row.try_get("inherited")?,
    })
}

#[derive(Clone)]
pub struct SharingRepository {
    db: DbHandles,
}

impl SharingRepository {
    pub fn new(db: DbHandles) -> Self {
        Self { db }
    }

    /// Sharing-link uniqueness is enforced within a run on
    /// `(site_id, file_folder_unique_id, url, kind, scope, audit_run_id)`;
    /// duplicates discovered in the same run are merged on that key.
    /// `file_folder_unique_id` is optional, and SQLite's UNIQUE treats every
    /// NULL as distinct from every other NULL, so both the index and this
    /// conflict target coalesce it to `''` before comparing.
    pub async fn upsert_link(&self, site_id: SiteId, audit_run_id: AuditRunId, link: &SharingLink) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO sharing_links (site_id, link_id, audit_run_id, item_guid, file_folder_unique_id, \
             url, kind, scope, flags_json, governance_json, created_at, created_by, modified_at, modified_by) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(site_id, COALESCE(file_folder_unique_id, ''), url, kind, scope, audit_run_id) DO UPDATE SET \
             item_guid = excluded.item_guid, flags_json = excluded.flags_json, \
             governance_json = excluded.governance_json, modified_at = excluded.modified_at, \
             modified_by = excluded.modified_by",
        )
        .bind(site_id.get())
        .bind(&link.link_id)
        .bind(audit_run_id.get())
        .bind(&link.item_guid)
        .bind(&link.file_folder_unique_id)
        .bind(&link.url)
        .bind(kind_str(link.kind))
        .bind(link.scope.as_raw())
        .bind(serde_json::to_string(&link.flags).unwrap_or_else(|_| "{}".to_string()))
        .bind(serde_json::to_string(&link.governance).ok())
        .bind(&link.governance.created_at)
        .bind(&link.governance.created_by)
        .bind(&link.governance.modified_at)
        .bind(&link.governance.modified_by)
        .execute(&self.db.write_pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_member(&self, site_id: SiteId, audit_run_id: AuditRunId, member: &SharingLinkMember) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO sharing_link_members (site_id, link_id, principal_id, audit_run_id) VALUES (?, ?, ?, ?) \
             ON CONFLICT(site_id, link_id, principal_id, audit_run_id) DO NOTHING",
        )
        .bind(site_id.get())
        .bind(&member.link_id)
        .bind(&member.principal_id)
        .bind(audit_run_id.get())
        .execute(&self.db.write_pool)
        .await?;
        Ok(())
    }

    pub async fn links_for_item(&self, site_id: SiteId, audit_run_id: AuditRunId, item_guid: &str) -> Result<Vec<SharingLink>, EngineError> {
        let rows = sqlx::query("SELECT * FROM sharing_links WHERE site_id = ? AND audit_run_id = ? AND item_guid = ?")
            .bind(site_id.get())
            .bind(audit_run_id.get())
            .bind(item_guid)
            .fetch_all(&self.db.read_pool)
            .await?;
        rows.iter().map(row_to_link).collect()
    }
}

fn kind_str(kind: SharingLinkKind) -> &'static str {
    match kind {
        SharingLinkKind::View => "view",
        SharingLinkKind::Edit => "edit",
        SharingLinkKind::Review => "review",
    }
}

fn sharing_link_kind_from_str(raw: &str) -> SharingLinkKind {
    match raw {
        "edit" => SharingLinkKind::Edit,
        "review" => SharingLinkKind::Review,
        _ => SharingLinkKind::View,
    }
}

pub(crate) fn row_to_link(row: &sqlx::sqlite::SqliteRow) -> Result<SharingLink, EngineError> {
    let flags_json: String = row.try_get("flags_json")?;
    let kind: String = row.try_get("kind")?;
    Ok(SharingLink {
        site_id: SiteId::new(row.try_get::<i64, _>("site_id")?),
        audit_run_id: AuditRunId::new(row.try_get::<i64, _>("audit_run_id")?),
        link_id: row.try_get("link_id")?,
        item_guid: row.try_get("item_guid")?,
        file_folder_unique_id: row.try_get("file_folder_unique_id")?,
        url: row.try_get("url")?,
        kind: sharing_link_kind_from_str(&kind),
        scope: SharingLinkScope::from_raw(row.try_get("scope")?),
        flags: serde_json::from_str(&flags_json).unwrap_or_default(),
        governance: SharingLinkGovernance {
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            modified_by: row.try_get("modified_by")?,
            modified_at: row.try_get("modified_at")?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spaudit_db::{open, DbConfig};

    async fn seed_run(db: &DbHandles) -> (SiteId, AuditRunId) {
        sqlx::query("INSERT INTO sites (url, title, created_at, updated_at) VALUES ('https://x', 't', datetime('now'), datetime('now'))")
            .execute(&db.write_pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO audit_runs (job_id, site_id, started_at, trigger) VALUES ('j1', 1, datetime('now'), 'manual')")
            .execute(&db.write_pool)
            .await
            .unwrap();
        (SiteId::new(1), AuditRunId::new(1))
    }

    #[tokio::test]
    async fn sharing_link_duplicate_collapses_on_unique_key() {
        let db = open(&DbConfig::sqlite_memory()).await.unwrap();
        let (site_id, run_id) = seed_run(&db).await;
        let repo = SharingRepository::new(db.clone());

        let link = SharingLink {
            site_id,
            audit_run_id: run_id,
            link_id: "L1".into(),
            item_guid: Some("G1".into()),
            file_folder_unique_id: Some("U1".into()),
            url: "https://t/shared".into(),
            kind: SharingLinkKind::View,
            scope: SharingLinkScope::SpecificPeople,
            flags: SharingLinkFlags::default(),
            governance: SharingLinkGovernance::default(),
        };
        repo.upsert_link(site_id, run_id, &link).await.unwrap();

        let mut duplicate = link.clone();
        duplicate.link_id = "L2".into();
        repo.upsert_link(site_id, run_id, &duplicate).await.unwrap();

        let links = repo.links_for_item(site_id, run_id, "G1").await.unwrap();
        assert_eq!(links.len(), 1);
    }

    #[tokio::test]
    async fn sharing_link_duplicate_collapses_when_file_folder_unique_id_is_null() {
        let db = open(&DbConfig::sqlite_memory()).await.unwrap();
        let (site_id, run_id) = seed_run(&db).await;
        let repo = SharingRepository::new(db.clone());

        let link = SharingLink {
            site_id,
            audit_run_id: run_id,
            link_id: "L1".into(),
            item_guid: Some("G1".into()),
            file_folder_unique_id: None,
            url: "https://t/shared".into(),
            kind: SharingLinkKind::View,
            scope: SharingLinkScope::SpecificPeople,
            flags: SharingLinkFlags::default(),
            governance: SharingLinkGovernance::default(),
        };
        repo.upsert_link(site_id, run_id, &link).await.unwrap();

        let mut duplicate = link.clone();
        duplicate.link_id = "L2".into();
        repo.upsert_link(site_id, run_id, &duplicate).await.unwrap();

        let links = repo.links_for_item(site_id, run_id, "G1").await.unwrap();
        assert_eq!(links.len(), 1);
    }
}
