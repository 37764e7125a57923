//! Domain entities, job state, error taxonomy, and the abstract SharePoint
//! collaborator shared by every other crate in the engine.

pub mod audit_run;
pub mod entities;
pub mod error;
pub mod job;
pub mod sharepoint;
pub mod site;

pub use audit_run::{AuditRun, AuditRunMetrics, AuditRunStatus, AuditRunTrigger};
pub use entities::{
    Item, List, ObjectType, Principal, PrincipalKind, RoleAssignment, RoleDefinition,
    SharingLink, SharingLinkFlags, SharingLinkGovernance, SharingLinkKind, SharingLinkMember,
    SharingLinkScope, Web,
};
pub use error::{EngineError, ErrorKind};
pub use job::{Job, JobContext, JobParams, JobState, JobStatus, Progress, Stage, Stats, TimelineEntry};
pub use sharepoint::{
    ItemDto, ItemPage, PrincipalDto, RoleAssignmentDto, RoleAssignmentsDto, RoleDefinitionDto,
    SharePointClient, SharingLinkDto, WebDto, ListDto,
};
pub use site::Site;
