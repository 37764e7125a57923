//! Snapshot entities: every row carries `(site_id, audit_run_id)` and is
//! immutable once its owning `AuditRun` is terminal.

use serde::{Deserialize, Serialize};
use spaudit_ids::{AuditRunId, SiteId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Web {
    pub site_id: SiteId,
    pub audit_run_id: AuditRunId,
    pub web_id: String,
    pub url: String,
    pub title: String,
    pub template: String,
    pub has_unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct List {
    pub site_id: SiteId,
    pub audit_run_id: AuditRunId,
    pub list_id: String,
    pub web_id: String,
    pub title: String,
    pub url: String,
    pub base_template: String,
    pub item_count: u64,
    pub has_unique: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub site_id: SiteId,
    pub audit_run_id: AuditRunId,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    Distribution,
    SecurityGroup,
    SpGroup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub site_id: SiteId,
    pub audit_run_id: AuditRunId,
    pub principal_id: String,
    pub kind: PrincipalKind,
    pub title: String,
    pub login_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub site_id: SiteId,
    pub audit_run_id: AuditRunId,
    pub role_def_id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Web,
    List,
    Item,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub site_id: SiteId,
    pub audit_run_id: AuditRunId,
    pub object_type: ObjectType,
    pub object_key: String,
    pub principal_id: String,
    pub role_def_id: String,
    pub inherited: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingLinkKind {
    View,
    Edit,
    Review,
}

/// Sharing-link visibility scope. Variant `3` ("existing access") is
/// documented upstream as hypothetical — kept open rather than collapsed
/// into the known variants, per the open question on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingLinkScope {
    Anonymous,
    Organization,
    SpecificPeople,
    ExistingAccess,
    Unknown(i64),
}

impl SharingLinkScope {
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => Self::Anonymous,
            1 => Self::Organization,
            2 => Self::SpecificPeople,
            3 => Self::ExistingAccess,
            other => Self::Unknown(other),
        }
    }

    pub fn as_raw(&self) -> i64 {
        match self {
            Self::Anonymous => 0,
            Self::Organization => 1,
            Self::SpecificPeople => 2,
            Self::ExistingAccess => 3,
            Self::Unknown(raw) => *raw,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingLinkFlags {
    pub edit: bool,
    pub review: bool,
    pub is_default: bool,
    pub active: bool,
    pub anonymous: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharingLinkGovernance {
    pub created_by: Option<String>,
    pub created_at: Option<String>,
    pub modified_by: Option<String>,
    pub modified_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharingLink {
    pub site_id: SiteId,
    pub audit_run_id: AuditRunId,
    pub link_id: String,
    pub item_guid: Option<String>,
    pub file_folder_unique_id: Option<String>,
    pub url: String,
    pub kind: SharingLinkKind,
    pub scope: SharingLinkScope,
    pub flags: SharingLinkFlags,
    pub governance: SharingLinkGovernance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharingLinkMember {
    pub site_id: SiteId,
    pub audit_run_id: AuditRunId,
    pub link_id: String,
    pub principal_id: String,
}
