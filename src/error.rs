//! Crate error type
//!
//! The frame pipeline itself never performs I/O; its only failures are
//! configuration or entity invariants being violated. Settings files add the
//! I/O and JSON variants.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid setting `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("invalid entity: {reason}")]
    InvalidEntity { reason: String },

    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings JSON malformed: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn entity(reason: impl Into<String>) -> Self {
        Self::InvalidEntity {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
