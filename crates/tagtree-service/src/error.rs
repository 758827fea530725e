use tagtree_gate::{GateError, TagOperation};
use tagtree_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("invalid argument '{argument}': {reason}")]
    InvalidArgument { argument: String, reason: String },

    #[error("unauthorized to {operation}: {reason}")]
    Unauthorized {
        operation: TagOperation,
        reason: String,
    },

    #[error("gate error: {0}")]
    Gate(#[from] GateError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn invalid(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// A concurrent write landed between this call's reads and its commit.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::not_found(format!("tag {id}")),
            StoreError::DuplicateRemoteId(remote_id) => {
                Self::invalid("remote_id", format!("remote id {remote_id} is already in use"))
            }
            other => Self::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
