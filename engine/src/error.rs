//! Error types for the fieldsync engine.

use crate::{ActionKind, ActionState};
use thiserror::Error;

/// All possible errors from the fieldsync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Payload errors
    #[error("invalid data url: {0}")]
    InvalidDataUrl(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("payload kind mismatch: column says {expected}, payload says {actual}")]
    KindMismatch {
        expected: ActionKind,
        actual: ActionKind,
    },

    #[error("unknown {field}: {value}")]
    UnknownValue { field: &'static str, value: String },

    // Lifecycle errors
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: ActionState, to: ActionState },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidPayload(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
