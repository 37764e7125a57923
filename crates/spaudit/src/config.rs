//! `EngineConfig::from_env()`: the one place this binary reads the
//! environment. Plain `std::env::var` reads with documented defaults,
//! since this engine exposes no CLI surface of its own — the HTTP binary
//! that would sit in front of it is out of scope.
//!
//! Invalid values never fail startup: they are replaced with the
//! documented default and logged with `tracing::warn!`, the same
//! clamp-and-warn convention `AuditConfig::clamped` uses for audit
//! parameters. Only DB open/migrate failure is fatal.

use spaudit_db::DbConfig;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retained for the HTTP layer this crate does not implement.
    pub http_addr: String,
    /// Retained for the HTTP layer this crate does not implement.
    pub http_log_path: Option<String>,
    pub db: DbConfig,
    pub log_level: String,
    pub log_format: spaudit_logging::LogFormat,
    pub log_output: spaudit_logging::LogOutput,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let db_default = DbConfig::default();
        Self {
            http_addr: env_string("HTTP_ADDR", ":8080"),
            http_log_path: std::env::var("HTTP_LOG_PATH").ok().filter(|s| !s.is_empty()),
            db: DbConfig {
                path: env_string("DB_PATH", &db_default.path),
                max_open_conns: env_parsed("DB_MAX_OPEN_CONNS", db_default.max_open_conns, |v| v > 0),
                max_idle_conns: env_parsed("DB_MAX_IDLE_CONNS", db_default.max_idle_conns, |_| true),
                conn_max_lifetime: env_duration_secs("DB_CONN_MAX_LIFETIME", db_default.conn_max_lifetime),
                conn_max_idle_time: env_duration_secs("DB_CONN_MAX_IDLE_TIME", db_default.conn_max_idle_time),
                busy_timeout: env_duration_millis("DB_BUSY_TIMEOUT_MS", db_default.busy_timeout),
                enable_foreign_keys: env_bool("DB_ENABLE_FOREIGN_KEYS", db_default.enable_foreign_keys),
                enable_wal: env_bool("DB_ENABLE_WAL", db_default.enable_wal),
            },
            log_level: env_string("LOG_LEVEL", "info"),
            log_format: match env_string("LOG_FORMAT", "json").as_str() {
                "text" => spaudit_logging::LogFormat::Text,
                "json" => spaudit_logging::LogFormat::Json,
                other => {
                    warn!(value = other, "LOG_FORMAT must be 'json' or 'text'; defaulting to 'json'");
                    spaudit_logging::LogFormat::Json
                }
            },
            log_output: match env_string("LOG_OUTPUT", "stdout").as_str() {
                "stderr" => spaudit_logging::LogOutput::Stderr,
                "stdout" => spaudit_logging::LogOutput::Stdout,
                other => {
                    warn!(value = other, "LOG_OUTPUT must be 'stdout' or 'stderr'; defaulting to 'stdout'");
                    spaudit_logging::LogOutput::Stdout
                }
            },
        }
        .warn_on_unsupported_strict_mode()
    }

    /// `DB_STRICT_MODE` is named in the external-interfaces table but
    /// `DbConfig` has no corresponding knob; reading it is a no-op, but we
    /// still tell the operator rather than silently ignoring it.
    fn warn_on_unsupported_strict_mode(self) -> Self {
        if std::env::var("DB_STRICT_MODE").is_ok() {
            warn!("DB_STRICT_MODE is set but not yet honored by this engine's storage layer");
        }
        self
    }

    pub fn log_config(&self) -> spaudit_logging::LogConfig {
        spaudit_logging::LogConfig {
            level: self.log_level.clone(),
            format: self.log_format,
            output: self.log_output,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|s| !s.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, value = raw, "expected true/false; using default {}", default);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_parsed<T: std::str::FromStr + std::fmt::Display + Copy>(key: &str, default: T, valid: impl Fn(T) -> bool) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) if valid(v) => v,
            _ => {
                warn!(key, value = raw, "invalid value; using default {}", default);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_duration_secs(key: &str, default: Duration) -> Duration {
    match std::env::var(key).ok().and_then(|raw| raw.parse::<u64>().ok()) {
        Some(secs) => Duration::from_secs(secs),
        None => default,
    }
}

fn env_duration_millis(key: &str, default: Duration) -> Duration {
    match std::env::var(key).ok().and_then(|raw| raw.parse::<u64>().ok()) {
        Some(ms) => Duration::from_millis(ms),
        None => default,
    }
}
