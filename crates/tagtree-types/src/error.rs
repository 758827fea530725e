use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid tag id: {0}")]
    InvalidId(String),

    #[error("invalid path string {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
}
