//! Error taxonomy shared across every layer of the engine. One variant per
//! row of the error-kind table; `kind()` lets callers branch on taxonomy
//! without matching the full enum (mirrors `ToolError::error_code` in the
//! corpus's MCP tool layer).

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    SiteScopeMismatch,
    AlreadyActive,
    NotActive,
    Cancelled,
    ValidationError,
    Transient,
    Fatal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("site scope mismatch: expected site {expected}, got {actual}")]
    SiteScopeMismatch { expected: i64, actual: i64 },

    #[error("already active: job {existing_job_id} is already running for this site")]
    AlreadyActive { existing_job_id: String },

    #[error("job {job_id} is not active")]
    NotActive { job_id: String },

    #[error("cancelled")]
    Cancelled,

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::SiteScopeMismatch { .. } => ErrorKind::SiteScopeMismatch,
            Self::AlreadyActive { .. } => ErrorKind::AlreadyActive,
            Self::NotActive { .. } => ErrorKind::NotActive,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ValidationError(_) => ErrorKind::ValidationError,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Fatal(_) => ErrorKind::Fatal,
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            other => Self::Fatal(other.to_string()),
        }
    }
}
