//! C9: root-cause analysis for a role assignment — why does this principal
//! have this permission? Checked in a fixed priority order, but unlike a
//! single best-match lookup every check that matches contributes a cause:
//! a sharing-link proxy that also holds a same-web root grant on another
//! object emits causes for both.

use spaudit_domain::{EngineError, Principal, RoleAssignment};
use spaudit_repo::ScopedReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// The assignment belongs to an auto-provisioned sharing-link group —
    /// identified by a principal login name shaped like
    /// `SharingLinks.{GUID}.{Type}.{GUID}`.
    SharingLink,
    /// Granted via SharePoint's built-in "Limited Access System Group".
    SystemGroup,
    /// Not a root assignment at all: the same principal holds a root grant
    /// on another object in the same web, and this one inherits from it.
    SameWebInheritance { source_object_key: String },
    /// No explanation found in the data available to the analyzer.
    Unknown,
}

const SYSTEM_GROUP_MARKER: &str = "Limited Access System Group";

/// Returns every cause that applies, in emission order (1: sharing link,
/// 2: system group, 3: one entry per same-web root), falling back to a
/// single `Unknown` only when nothing else matched.
pub async fn analyze_cause(
    reader: &ScopedReader,
    web_id: &str,
    assignment: &RoleAssignment,
    principal: Option<&Principal>,
) -> Result<Vec<Cause>, EngineError> {
    let mut causes = Vec::new();

    if let Some(principal) = principal {
        if is_sharing_link_principal(&principal.login_name) {
            causes.push(Cause::SharingLink);
        }
        if principal.title.contains(SYSTEM_GROUP_MARKER) || principal.login_name.contains(SYSTEM_GROUP_MARKER) {
            causes.push(Cause::SystemGroup);
        }
    }

    let roots = reader.root_assignments_for_principal(&assignment.principal_id).await?;
    for root in &roots {
        if root.object_key == assignment.object_key {
            continue;
        }
        if same_web(reader, web_id, &root.object_key).await? {
            causes.push(Cause::SameWebInheritance { source_object_key: root.object_key.clone() });
        }
    }

    if causes.is_empty() {
        causes.push(Cause::Unknown);
    }

    Ok(causes)
}

async fn same_web(reader: &ScopedReader, web_id: &str, object_key: &str) -> Result<bool, EngineError> {
    if object_key == web_id {
        return Ok(true);
    }
    if let Some(list) = reader.get_list(reader.site_id(), object_key).await? {
        return Ok(list.web_id == web_id);
    }
    Ok(false)
}

/// `SharingLinks.{GUID}.{Type}.{GUID}` — four dot-separated segments, the
/// second and fourth of which look like UUIDs. Checked with plain string
/// parsing rather than a regex engine; the shape is simple and fixed.
fn is_sharing_link_principal(login_name: &str) -> bool {
    let parts: Vec<&str> = login_name.split('.').collect();
    parts.len() == 4 && parts[0] == "SharingLinks" && is_guid_like(parts[1]) && is_guid_like(parts[3])
}

fn is_guid_like(segment: &str) -> bool {
    let cleaned: Vec<&str> = segment.split('-').collect();
    match cleaned.as_slice() {
        [a, b, c, d, e] => {
            [8, 4, 4, 4, 12] == [a.len(), b.len(), c.len(), d.len(), e.len()]
                && cleaned.iter().all(|g| g.chars().all(|c| c.is_ascii_hexdigit()))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_well_formed_sharing_link_principal() {
        assert!(is_sharing_link_principal(
            "SharingLinks.3fa85f64-5717-4562-b3fc-2c963f66afa6.OrganizationView.1b9d6bcd-bbfd-4b2d-9b5d-ab8dfbbd4bed"
        ));
    }

    #[test]
    fn rejects_unrelated_login_names() {
        assert!(!is_sharing_link_principal("i:0#.f|membership|alice@example.com"));
        assert!(!is_sharing_link_principal("SharingLinks.not-a-guid.View.also-not"));
    }
}
