//! The abstract SharePoint collaborator. A real implementation (a REST
//! client, out of scope for this crate) implements `SharePointClient`; the
//! audit workflow executor only ever sees this trait and its DTOs.

use crate::entities::{ObjectType, PrincipalKind, SharingLinkFlags, SharingLinkGovernance, SharingLinkKind, SharingLinkScope};
use crate::error::EngineError;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct WebDto {
    pub web_id: String,
    pub url: String,
    pub title: String,
    pub template: String,
    pub has_unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListDto {
    pub list_id: String,
    pub web_id: String,
    pub title: String,
    pub url: String,
    pub base_template: String,
    pub item_count: u64,
    pub has_unique: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemDto {
    pub item_guid: String,
    pub list_id: String,
    pub item_id: u64,
    pub list_item_guid: Option<String>,
    pub name: String,
    pub url: String,
    pub is_file: bool,
    pub is_folder: bool,
    pub has_unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalDto {
    pub principal_id: String,
    pub kind: PrincipalKind,
    pub title: String,
    pub login_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleDefinitionDto {
    pub role_def_id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleAssignmentDto {
    pub object_type: ObjectType,
    pub object_key: String,
    pub principal: PrincipalDto,
    pub role_def: RoleDefinitionDto,
    pub inherited: bool,
}

/// The full result of asking the SharePoint client for permissions on a
/// single web/list/item object: every assignment plus the principals and
/// role definitions they reference, so the caller can upsert both sides in
/// one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleAssignmentsDto {
    pub assignments: Vec<RoleAssignmentDto>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SharingLinkDto {
    pub link_id: String,
    pub item_guid: Option<String>,
    pub file_folder_unique_id: Option<String>,
    pub url: String,
    pub kind: SharingLinkKind,
    pub scope: SharingLinkScope,
    pub flags: SharingLinkFlags,
    pub governance: SharingLinkGovernance,
    pub members: Vec<PrincipalDto>,
}

/// A page of items, with enough information for the caller to keep paging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPage {
    pub items: Vec<ItemDto>,
    pub has_more: bool,
}

/// Abstract collaborator yielding webs, lists, items, principals, role
/// assignments and sharing links for a site. The real implementation (a
/// SharePoint REST client) is out of scope for this crate; only the shape
/// of the data it returns is defined here.
#[async_trait]
pub trait SharePointClient: Send + Sync {
    async fn fetch_webs(&self, site_url: &str) -> Result<Vec<WebDto>, EngineError>;

    async fn fetch_lists(&self, site_url: &str, web_id: &str) -> Result<Vec<ListDto>, EngineError>;

    async fn fetch_list_role_assignments(
        &self,
        site_url: &str,
        list_id: &str,
    ) -> Result<RoleAssignmentsDto, EngineError>;

    async fn fetch_items(
        &self,
        site_url: &str,
        list_id: &str,
        batch_size: u32,
        offset: u32,
    ) -> Result<ItemPage, EngineError>;

    async fn fetch_item_role_assignments(
        &self,
        site_url: &str,
        item_guid: &str,
    ) -> Result<RoleAssignmentsDto, EngineError>;

    async fn fetch_sharing_links(
        &self,
        site_url: &str,
        item_guid: &str,
    ) -> Result<Vec<SharingLinkDto>, EngineError>;
}
