//! The boundary between job lifecycle management and the work a job
//! actually performs. `spaudit_audit` implements this trait; this crate
//! never depends on it the other way around.

use crate::cancel::CancellationToken;
use crate::progress::ProgressReporter;
use async_trait::async_trait;
use spaudit_domain::{EngineError, JobParams};

#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Runs one job to completion or cancellation. `params` carries the
    /// per-call overrides a start request supplied (batch size, retry
    /// policy, deep-scan flags, …); an executor that ignores them just
    /// falls back to its own configured defaults.
    async fn run(
        &self,
        site_url: String,
        params: JobParams,
        cancel: CancellationToken,
        progress: ProgressReporter,
    ) -> Result<serde_json::Value, EngineError>;
}
