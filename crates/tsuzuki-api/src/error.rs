use thiserror::Error;

use crate::traits::SourceKind;

/// Errors from a stream source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{kind} does not support {operation}")]
    Unsupported {
        kind: SourceKind,
        operation: &'static str,
    },

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("not found: {0}")]
    NotFound(String),
}
