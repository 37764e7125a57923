//! C11: pure-function risk scoring over already-persisted facts. No I/O —
//! every function here takes plain data and returns a score, so it's cheap
//! to unit test and safe to call from any layer. Permission, sharing and
//! content risk are three independent 0-100 scores, each with its own
//! three-level `High`/`Medium`/`Low` scale; there is no unified scale and no
//! `Critical` level across them.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Counts over a scoped object (a site, web, list, or item) feeding the
/// permission-risk formula.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionExposure {
    pub items_with_unique: u32,
    pub total_items: u32,
    pub high_risk_assignments: u32,
    pub sharing_links: u32,
    pub full_control_grants: u32,
    pub contribute_grants: u32,
}

/// `50*items_with_unique/total_items + min(log10(high_risk)*8,25) +
/// min(1.5*sharing_links,15) + min(1.5*(full_control+contribute),10)`. When
/// there is no unique-permission exposure, no sharing links, and no elevated
/// direct grant, the raw sum is halved and capped at 15 — a site with only
/// ambient high-risk-assignment noise and nothing else shouldn't read as
/// more exposed than one with an actual unique-permission island.
pub fn permission_risk_score(exposure: PermissionExposure) -> u32 {
    let unique_ratio = if exposure.total_items == 0 {
        0.0
    } else {
        exposure.items_with_unique as f64 / exposure.total_items as f64
    };
    let high_risk_component = if exposure.high_risk_assignments == 0 {
        0.0
    } else {
        ((exposure.high_risk_assignments as f64).log10() * 8.0).min(25.0)
    };
    let sharing_component = (1.5 * exposure.sharing_links as f64).min(15.0);
    let elevated_grants = exposure.full_control_grants + exposure.contribute_grants;
    let elevated_component = (1.5 * elevated_grants as f64).min(10.0);

    let mut sum = 50.0 * unique_ratio + high_risk_component + sharing_component + elevated_component;

    if exposure.items_with_unique == 0 && exposure.sharing_links == 0 && elevated_grants == 0 {
        sum = (sum * 0.5).min(15.0);
    }

    sum.round().clamp(0.0, 100.0) as u32
}

pub fn permission_risk_level(score: u32) -> RiskLevel {
    match score {
        s if s >= 50 => RiskLevel::High,
        s if s >= 20 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

/// Counts over the sharing links attached to a scoped object, feeding the
/// sharing-risk formula.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SharingExposure {
    pub total_links: u32,
    pub flexible_links: u32,
    pub edit_links: u32,
    pub has_anonymous_link: bool,
    pub has_link_without_expiration: bool,
}

/// Additive score from total-link volume (capped 0-40), the fraction of
/// links that are "flexible" (anonymous/organization scope, capped 0-30),
/// and the fraction that grant edit (capped 0-15), plus flat bonuses for an
/// anonymous link or a link with no expiration set.
pub fn sharing_risk_score(exposure: SharingExposure) -> u32 {
    if exposure.total_links == 0 {
        return 0;
    }

    let volume_component = (exposure.total_links as f64 * 4.0).min(40.0);
    let flexible_ratio = exposure.flexible_links as f64 / exposure.total_links as f64;
    let edit_ratio = exposure.edit_links as f64 / exposure.total_links as f64;
    let flexible_component = flexible_ratio * 30.0;
    let edit_component = edit_ratio * 15.0;

    let mut sum = volume_component + flexible_component + edit_component;
    if exposure.has_anonymous_link {
        sum += 15.0;
    }
    if exposure.has_link_without_expiration {
        sum += 10.0;
    }

    sum.round().clamp(0.0, 100.0) as u32
}

pub fn sharing_risk_level(score: u32) -> RiskLevel {
    match score {
        s if s >= 60 => RiskLevel::High,
        s if s >= 30 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

/// Counts over the content of a list or library, feeding the content-risk
/// formula.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentExposure {
    pub total_items: u32,
    pub items_with_unique: u32,
    pub sensitive_extension_count: u32,
    pub executable_extension_count: u32,
    pub distinct_extension_count: u32,
}

/// Blends item volume, sensitive/executable file extensions, the
/// unique-permission ratio, and extension-type diversity into a single
/// 0-100 score.
pub fn content_risk_score(exposure: ContentExposure) -> u32 {
    let volume_component = (exposure.total_items as f64 * 0.05).min(20.0);
    let sensitive_component = (exposure.sensitive_extension_count as f64 * 5.0).min(25.0);
    let executable_component = (exposure.executable_extension_count as f64 * 8.0).min(25.0);
    let unique_ratio = if exposure.total_items == 0 {
        0.0
    } else {
        exposure.items_with_unique as f64 / exposure.total_items as f64
    };
    let unique_component = unique_ratio * 20.0;
    let diversity_component = (exposure.distinct_extension_count as f64 * 2.0).min(10.0);

    let sum = volume_component + sensitive_component + executable_component + unique_component + diversity_component;
    sum.round().clamp(0.0, 100.0) as u32
}

pub fn content_risk_level(score: u32) -> RiskLevel {
    match score {
        s if s >= 70 => RiskLevel::High,
        s if s >= 40 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}
