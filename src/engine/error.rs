use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad or missing request field; maps to a 4xx.
    #[error("invalid `{field}`: {message}")]
    Validation { field: &'static str, message: String },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    /// Storage unreachable; maps to a 5xx. Not retried here.
    #[error("data access error: {0}")]
    DataAccess(String),
    #[error("malformed {kind} row {id}: {reason}")]
    MalformedRow {
        kind: &'static str,
        id: String,
        reason: String,
    },
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl EngineError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn malformed(kind: &'static str, id: &str, reason: impl Into<String>) -> Self {
        EngineError::MalformedRow {
            kind,
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the caller sent something wrong rather than the system failing.
    pub fn is_client_error(&self) -> bool {
        matches!(self, EngineError::Validation { .. } | EngineError::LimitExceeded(_))
    }
}
