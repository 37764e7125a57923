//! Pipeline tuning knobs. Values arrive from `EngineConfig` (env vars) as
//! the executor's baseline, then `JobParams` (a start request's per-call
//! overrides) are layered on top via `with_overrides`; this module only
//! owns the clamping so the executor never has to think about out-of-range
//! input from either source.

use spaudit_domain::JobParams;
use std::time::Duration;
use tracing::warn;

pub const MIN_BATCH_SIZE: u32 = 1;
pub const MAX_BATCH_SIZE: u32 = 5000;
pub const MIN_RETRIES: u32 = 0;
pub const MAX_RETRIES: u32 = 10;
pub const MIN_TIMEOUT: Duration = Duration::from_secs(60);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(7200);

#[derive(Debug, Clone, Copy)]
pub struct AuditConfig {
    pub batch_size: u32,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    /// Drives `item_permissions` for lists that don't themselves have
    /// unique permissions — the `scan_individual_items` form key.
    pub deep_scan: bool,
    /// Excludes hidden lists from `lists_enumeration` and every stage
    /// downstream of it.
    pub skip_hidden: bool,
    /// Gates the `sharing_audit` stage entirely.
    pub include_sharing: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(300),
            deep_scan: false,
            skip_hidden: true,
            include_sharing: true,
        }
    }
}

impl AuditConfig {
    /// Layers a start request's overrides on top of this baseline. Absent
    /// fields in `params` fall through to the existing value; the result is
    /// not yet clamped — callers must still call `clamped()`.
    pub fn with_overrides(mut self, params: &JobParams) -> Self {
        if let Some(batch_size) = params.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(max_retries) = params.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(retry_delay_ms) = params.retry_delay_ms {
            self.retry_delay = Duration::from_millis(retry_delay_ms);
        }
        if let Some(timeout_secs) = params.timeout_secs {
            self.timeout = Duration::from_secs(timeout_secs);
        }
        if let Some(deep_scan) = params.scan_individual_items {
            self.deep_scan = deep_scan;
        }
        if let Some(skip_hidden) = params.skip_hidden {
            self.skip_hidden = skip_hidden;
        }
        if let Some(include_sharing) = params.include_sharing {
            self.include_sharing = include_sharing;
        }
        self
    }

    /// Clamps every field to its valid range, warning once per field that
    /// needed correcting rather than failing startup over a tuning knob.
    pub fn clamped(mut self) -> Self {
        if self.batch_size < MIN_BATCH_SIZE || self.batch_size > MAX_BATCH_SIZE {
            warn!(requested = self.batch_size, "batch_size out of range, clamping");
            self.batch_size = self.batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
        }
        if self.max_retries > MAX_RETRIES {
            warn!(requested = self.max_retries, "max_retries out of range, clamping");
            self.max_retries = self.max_retries.clamp(MIN_RETRIES, MAX_RETRIES);
        }
        if self.timeout < MIN_TIMEOUT || self.timeout > MAX_TIMEOUT {
            warn!(requested_secs = self.timeout.as_secs(), "timeout out of range, clamping");
            self.timeout = self.timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_corrects_batch_size_and_timeout() {
        let config = AuditConfig { batch_size: 10_000, timeout: Duration::from_secs(1), ..AuditConfig::default() }.clamped();
        assert_eq!(config.batch_size, MAX_BATCH_SIZE);
        assert_eq!(config.timeout, MIN_TIMEOUT);
    }

    #[test]
    fn with_overrides_leaves_unset_fields_untouched() {
        let params = JobParams { batch_size: Some(250), ..JobParams::default() };
        let config = AuditConfig::default().with_overrides(&params);
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.max_retries, AuditConfig::default().max_retries);
    }
}
