//! Site audit pipeline (C6), root-cause analysis (C9), and risk scoring (C11).

pub mod causes;
pub mod config;
pub mod executor;
pub mod retry;
pub mod risk;

pub use causes::{analyze_cause, Cause};
pub use config::AuditConfig;
pub use executor::SiteAuditExecutor;
pub use risk::{
    content_risk_level, content_risk_score, permission_risk_level, permission_risk_score, sharing_risk_level, sharing_risk_score,
    ContentExposure, PermissionExposure, RiskLevel, SharingExposure,
};
