//! C6: the 7-stage site audit pipeline. Fetches from `SharePointClient` in
//! configured batches, retries transient failures, persists every fact
//! through `SharePointAuditRepository`, and checks for cancellation between
//! lists, between item batches, and before each sharing-link lookup.

use crate::config::AuditConfig;
use crate::retry::retry_with_backoff;
use async_trait::async_trait;
use spaudit_domain::entities::{Item, List, Principal, RoleAssignment, RoleDefinition, Web};
use spaudit_domain::job::Stage;
use spaudit_domain::sharepoint::{PrincipalDto, RoleAssignmentsDto, SharingLinkDto};
use spaudit_domain::{EngineError, JobParams, ObjectType, SharePointClient, SharingLink, SharingLinkMember};
use spaudit_ids::SiteId;
use spaudit_jobs::{CancellationToken, JobExecutor, ProgressReporter};
use spaudit_repo::SharePointAuditRepository;
use std::sync::Arc;

pub struct SiteAuditExecutor {
    client: Arc<dyn SharePointClient>,
    repo: SharePointAuditRepository,
    config: AuditConfig,
}

impl SiteAuditExecutor {
    pub fn new(client: Arc<dyn SharePointClient>, repo: SharePointAuditRepository, config: AuditConfig) -> Self {
        Self { client, repo, config: config.clamped() }
    }

    async fn check_cancelled(&self, cancel: &CancellationToken) -> Result<(), EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    async fn persist_role_assignments(
        &self,
        site_id: SiteId,
        object_type: ObjectType,
        object_key: &str,
        dto: RoleAssignmentsDto,
    ) -> Result<u64, EngineError> {
        let mut seen_principals = std::collections::HashSet::new();
        let mut seen_roles = std::collections::HashSet::new();
        let count = dto.assignments.len() as u64;

        for assignment in dto.assignments {
            if seen_principals.insert(assignment.principal.principal_id.clone()) {
                self.repo.upsert_principal(site_id, to_principal(&assignment.principal)).await?;
            }
            if seen_roles.insert(assignment.role_def.role_def_id.clone()) {
                self.repo
                    .upsert_role_definition(site_id, to_role_definition(&assignment.role_def))
                    .await?;
            }
            self.repo
                .upsert_role_assignment(
                    site_id,
                    RoleAssignment {
                        site_id,
                        audit_run_id: self.repo.audit_run_id(),
                        object_type,
                        object_key: object_key.to_string(),
                        principal_id: assignment.principal.principal_id,
                        role_def_id: assignment.role_def.role_def_id,
                        inherited: assignment.inherited,
                    },
                )
                .await?;
        }
        Ok(count)
    }

    async fn persist_sharing_links(&self, site_id: SiteId, item_guid: &str, links: Vec<SharingLinkDto>) -> Result<u64, EngineError> {
        let count = links.len() as u64;
        for link in links {
            let link_id = link.link_id.clone();
            self.repo
                .upsert_sharing_link(
                    site_id,
                    SharingLink {
                        site_id,
                        audit_run_id: self.repo.audit_run_id(),
                        link_id: link_id.clone(),
                        item_guid: link.item_guid.clone().or_else(|| Some(item_guid.to_string())),
                        file_folder_unique_id: link.file_folder_unique_id,
                        url: link.url,
                        kind: link.kind,
                        scope: link.scope,
                        flags: link.flags,
                        governance: link.governance,
                    },
                )
                .await?;
            for member in link.members {
                self.repo
                    .upsert_sharing_link_member(
                        site_id,
                        SharingLinkMember {
                            site_id,
                            audit_run_id: self.repo.audit_run_id(),
                            link_id: link_id.clone(),
                            principal_id: member.principal_id,
                        },
                    )
                    .await?;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl JobExecutor for SiteAuditExecutor {
    async fn run(
        &self,
        site_url: String,
        params: JobParams,
        cancel: CancellationToken,
        progress: ProgressReporter,
    ) -> Result<serde_json::Value, EngineError> {
        let config = self.config.with_overrides(&params).clamped();

        // Stage 1: Initialize. The site row is upserted under a placeholder
        // title; `site_id` is resolved here and threaded explicitly through
        // every call below rather than cached, per the repository's design.
        progress.update(Stage::Initialize, "starting audit", 0, None).await?;
        let site_id = self.repo.upsert_site(&site_url, "").await?;
        self.check_cancelled(&cancel).await?;

        // Stage 2: SiteMetadata.
        progress.update(Stage::SiteMetadata, "fetching site metadata", 0, None).await?;
        let webs = retry_with_backoff(config.max_retries, config.retry_delay, || self.client.fetch_webs(&site_url)).await?;
        for web in &webs {
            self.repo.upsert_web(site_id, to_web(web)).await?;
        }
        self.check_cancelled(&cancel).await?;

        // Stage 3: ListsEnumeration. Lists marked hidden by the site are
        // dropped here rather than merely unpersisted, so every later stage
        // (permissions, items, sharing) naturally excludes them too.
        progress.update(Stage::ListsEnumeration, "enumerating lists", 0, Some(webs.len() as u64)).await?;
        let mut all_lists = Vec::new();
        for (i, web) in webs.iter().enumerate() {
            let lists = retry_with_backoff(config.max_retries, config.retry_delay, || {
                self.client.fetch_lists(&site_url, &web.web_id)
            })
            .await?;
            for list in lists {
                if list.hidden && config.skip_hidden {
                    continue;
                }
                self.repo.upsert_list(site_id, to_list(&list)).await?;
                all_lists.push(list);
            }
            progress
                .update(Stage::ListsEnumeration, "enumerating lists", (i + 1) as u64, Some(webs.len() as u64))
                .await?;
            self.check_cancelled(&cancel).await?;
        }

        // Stage 4: ListPermissions.
        let mut permissions_analyzed = 0u64;
        for (i, list) in all_lists.iter().enumerate() {
            self.check_cancelled(&cancel).await?;
            let assignments = retry_with_backoff(config.max_retries, config.retry_delay, || {
                self.client.fetch_list_role_assignments(&site_url, &list.list_id)
            })
            .await?;
            permissions_analyzed += self
                .persist_role_assignments(site_id, ObjectType::List, &list.list_id, assignments)
                .await?;
            progress
                .update(Stage::ListPermissions, "auditing list permissions", (i + 1) as u64, Some(all_lists.len() as u64))
                .await?;
        }

        // Stage 5: ItemPermissions. Scoped to lists with unique permissions
        // (or when a deep scan was requested) rather than every list, since
        // item-level enumeration is the most expensive stage per list. Items
        // are fetched in batches of `config.batch_size`; cancellation is
        // checked between batches, not just between lists, since a single
        // list can hold far more items than fit in one batch.
        let mut all_item_guids = Vec::new();
        for (list_idx, list) in all_lists.iter().enumerate() {
            if !(list.has_unique || config.deep_scan) {
                continue;
            }
            let mut offset = 0u32;
            loop {
                self.check_cancelled(&cancel).await?;
                let page = retry_with_backoff(config.max_retries, config.retry_delay, || {
                    self.client.fetch_items(&site_url, &list.list_id, config.batch_size, offset)
                })
                .await?;
                let page_len = page.items.len();
                for item in &page.items {
                    self.repo.upsert_item(site_id, to_item(item)).await?;
                    let assignments = retry_with_backoff(config.max_retries, config.retry_delay, || {
                        self.client.fetch_item_role_assignments(&site_url, &item.item_guid)
                    })
                    .await?;
                    permissions_analyzed += self
                        .persist_role_assignments(site_id, ObjectType::Item, &item.item_guid, assignments)
                        .await?;
                    all_item_guids.push(item.item_guid.clone());
                }
                progress
                    .update(
                        Stage::ItemPermissions,
                        "auditing item permissions",
                        (list_idx + 1) as u64,
                        Some(all_lists.len() as u64),
                    )
                    .await?;
                if !page.has_more || page_len == 0 {
                    break;
                }
                offset += config.batch_size;
            }
        }

        // Stage 6: SharingAudit.
        let mut sharing_links_found = 0u64;
        if config.include_sharing {
            for (i, item_guid) in all_item_guids.iter().enumerate() {
                self.check_cancelled(&cancel).await?;
                let links = retry_with_backoff(config.max_retries, config.retry_delay, || {
                    self.client.fetch_sharing_links(&site_url, item_guid)
                })
                .await?;
                sharing_links_found += self.persist_sharing_links(site_id, item_guid, links).await?;
                progress
                    .update(Stage::SharingAudit, "auditing sharing links", (i + 1) as u64, Some(all_item_guids.len() as u64))
                    .await?;
            }
        }

        // Stage 7: Finalize.
        progress.update(Stage::Finalize, "finalizing", 1, Some(1)).await?;
        Ok(serde_json::json!({
            "site_id": site_id.get(),
            "lists_found": all_lists.len(),
            "items_found": all_item_guids.len(),
            "permissions_analyzed": permissions_analyzed,
            "sharing_links_found": sharing_links_found,
        }))
    }
}

fn to_web(dto: &spaudit_domain::sharepoint::WebDto) -> Web {
    Web {
        site_id: SiteId::new(0),
        audit_run_id: spaudit_ids::AuditRunId::new(0),
        web_id: dto.web_id.clone(),
        url: dto.url.clone(),
        title: dto.title.clone(),
        template: dto.template.clone(),
        has_unique: dto.has_unique,
    }
}

fn to_list(dto: &spaudit_domain::sharepoint::ListDto) -> List {
    List {
        site_id: SiteId::new(0),
        audit_run_id: spaudit_ids::AuditRunId::new(0),
        list_id: dto.list_id.clone(),
        web_id: dto.web_id.clone(),
        title: dto.title.clone(),
        url: dto.url.clone(),
        base_template: dto.base_template.clone(),
        item_count: dto.item_count,
        has_unique: dto.has_unique,
        hidden: dto.hidden,
    }
}

fn to_item(dto: &spaudit_domain::sharepoint::ItemDto) -> Item {
    Item {
        site_id: SiteId::new(0),
        audit_run_id: spaudit_ids::AuditRunId::new(0),
        item_guid: dto.item_guid.clone(),
        list_id: dto.list_id.clone(),
        item_id: dto.item_id,
        list_item_guid: dto.list_item_guid.clone(),
        name: dto.name.clone(),
        url: dto.url.clone(),
        is_file: dto.is_file,
        is_folder: dto.is_folder,
        has_unique: dto.has_unique,
    }
}

fn to_principal(dto: &PrincipalDto) -> Principal {
    Principal {
        site_id: SiteId::new(0),
        audit_run_id: spaudit_ids::AuditRunId::new(0),
        principal_id: dto.principal_id.clone(),
        kind: dto.kind,
        title: dto.title.clone(),
        login_name: dto.login_name.clone(),
        email: dto.email.clone(),
    }
}

fn to_role_definition(dto: &spaudit_domain::sharepoint::RoleDefinitionDto) -> RoleDefinition {
    RoleDefinition {
        site_id: SiteId::new(0),
        audit_run_id: spaudit_ids::AuditRunId::new(0),
        role_def_id: dto.role_def_id.clone(),
        name: dto.name.clone(),
        description: dto.description.clone(),
    }
}
