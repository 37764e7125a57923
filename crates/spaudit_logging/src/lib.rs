//! Structured logging setup for the audit engine.
//!
//! Mirrors `LOG_LEVEL` / `LOG_FORMAT` / `LOG_OUTPUT` from the environment
//! table: a single `tracing_subscriber::fmt` layer, text or JSON, writing to
//! stdout or stderr, filtered by an `EnvFilter` built from `LOG_LEVEL` with a
//! crate-scoped fallback directive.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "spaudit=info,spaudit_audit=info,spaudit_jobs=info";

/// Where log output is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
}

/// How log lines are formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration for the engine binary.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            output: LogOutput::Stdout,
        }
    }
}

/// Initialize the global `tracing` subscriber. Call exactly once at startup.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level)
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .context("failed to build logging filter")?;

    let layer = match (config.format, config.output) {
        (LogFormat::Json, LogOutput::Stdout) => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stdout)
            .boxed(),
        (LogFormat::Json, LogOutput::Stderr) => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        (LogFormat::Text, LogOutput::Stdout) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .boxed(),
        (LogFormat::Text, LogOutput::Stderr) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}
