//! Aggregate repositories: compose scoped reads across several tables in a
//! single read transaction so a composite view is internally consistent
//! with exactly one snapshot, even under concurrent writers to other runs.

use spaudit_db::{with_read_tx, DbHandles};
use spaudit_domain::{EngineError, List, ObjectType, Principal, RoleAssignment, RoleDefinition};
use spaudit_ids::{AuditRunId, SiteId};
use sqlx::Row;

#[derive(Debug, Clone, PartialEq)]
pub struct ListOverview {
    pub list: List,
    pub items_persisted: u64,
}

#[derive(Clone)]
pub struct SiteContentRepository {
    db: DbHandles,
}

impl SiteContentRepository {
    pub fn new(db: DbHandles) -> Self {
        Self { db }
    }

    pub async fn list_overview(
        &self,
        site_id: SiteId,
        audit_run_id: AuditRunId,
    ) -> Result<Vec<ListOverview>, EngineError> {
        with_read_tx::<_, EngineError, _>(&self.db.read_pool, move |tx| {
            Box::pin(async move {
                let list_rows = sqlx::query("SELECT * FROM lists WHERE site_id = ? AND audit_run_id = ? ORDER BY list_id")
                    .bind(site_id.get())
                    .bind(audit_run_id.get())
                    .fetch_all(&mut **tx)
                    .await?;

                let mut overviews = Vec::with_capacity(list_rows.len());
                for row in &list_rows {
                    let list_id: String = row.try_get("list_id")?;
                    let count: i64 = sqlx::query_scalar(
                        "SELECT COUNT(*) FROM items WHERE site_id = ? AND audit_run_id = ? AND list_id = ?",
                    )
                    .bind(site_id.get())
                    .bind(audit_run_id.get())
                    .bind(&list_id)
                    .fetch_one(&mut **tx)
                    .await?;

                    overviews.push(ListOverview {
                        list: crate::entity_repo::row_to_list(row)?,
                        items_persisted: count as u64,
                    });
                }
                Ok(overviews)
            })
        })
        .await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentDetail {
    pub assignment: RoleAssignment,
    pub principal: Option<Principal>,
    pub role_definition: Option<RoleDefinition>,
}

#[derive(Clone)]
pub struct PermissionRepository {
    db: DbHandles,
}

impl PermissionRepository {
    pub fn new(db: DbHandles) -> Self {
        Self { db }
    }

    pub async fn assignments_with_detail(
        &self,
        site_id: SiteId,
        audit_run_id: AuditRunId,
        object_type: ObjectType,
        object_key: &str,
    ) -> Result<Vec<AssignmentDetail>, EngineError> {
        let object_type_str = crate::entity_repo::object_type_to_str(object_type).to_string();
        let object_key = object_key.to_string();

        with_read_tx::<_, EngineError, _>(&self.db.read_pool, move |tx| {
            Box::pin(async move {
                let rows = sqlx::query(
                    "SELECT * FROM role_assignments WHERE site_id = ? AND audit_run_id = ? AND object_type = ? AND object_key = ?",
                )
                .bind(site_id.get())
                .bind(audit_run_id.get())
                .bind(&object_type_str)
                .bind(&object_key)
                .fetch_all(&mut **tx)
                .await?;

                let mut details = Vec::with_capacity(rows.len());
                for row in &rows {
                    let assignment = crate::entity_repo::row_to_assignment(row)?;

                    let principal_row = sqlx::query(
                        "SELECT * FROM principals WHERE site_id = ? AND audit_run_id = ? AND principal_id = ?",
                    )
                    .bind(site_id.get())
                    .bind(audit_run_id.get())
                    .bind(&assignment.principal_id)
                    .fetch_optional(&mut **tx)
                    .await?;

                    let role_row = sqlx::query(
                        "SELECT * FROM role_definitions WHERE site_id = ? AND audit_run_id = ? AND role_def_id = ?",
                    )
                    .bind(site_id.get())
                    .bind(audit_run_id.get())
                    .bind(&assignment.role_def_id)
                    .fetch_optional(&mut **tx)
                    .await?;

                    details.push(AssignmentDetail {
                        principal: principal_row.as_ref().map(crate::entity_repo::row_to_principal).transpose()?,
                        role_definition: role_row.as_ref().map(crate::entity_repo::row_to_role_definition).transpose()?,
                        assignment,
                    });
                }
                Ok(details)
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SharePointAuditRepository, SiteRepository};
    use spaudit_db::{open, DbConfig};
    use spaudit_domain::List;
    use spaudit_ids::JobId;

    #[tokio::test]
    async fn list_overview_reflects_persisted_item_counts() {
        let db = open(&DbConfig::sqlite_memory()).await.unwrap();
        let site_id = SiteRepository::new(db.clone()).upsert_site("https://t/s/A", "A").await.unwrap();
        sqlx::query("INSERT INTO audit_runs (job_id, site_id, started_at, trigger) VALUES (?, ?, datetime('now'), 'manual')")
            .bind(JobId::new().as_str())
            .bind(site_id.get())
            .execute(&db.write_pool)
            .await
            .unwrap();
        let run_id = AuditRunId::new(1);

        let writer = SharePointAuditRepository::new(run_id, db.clone());
        writer
            .upsert_list(
                site_id,
                List {
                    site_id,
                    audit_run_id: run_id,
                    list_id: "L1".into(),
                    web_id: "W1".into(),
                    title: "Docs".into(),
                    url: "/Docs".into(),
                    base_template: "101".into(),
                    item_count: 0,
                    has_unique: false,
                    hidden: false,
                },
            )
            .await
            .unwrap();

        let repo = SiteContentRepository::new(db);
        let overview = repo.list_overview(site_id, run_id).await.unwrap();
        assert_eq!(overview.len(), 1);
        assert_eq!(overview[0].items_persisted, 0);
    }
}
