use tagtree_types::TagId;

/// Errors from persistence backend and link index operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The referenced tag row does not exist.
    #[error("tag not found: {0}")]
    NotFound(TagId),

    /// A write would leave two rows sharing one remote id.
    #[error("remote id already in use: {0}")]
    DuplicateRemoteId(String),

    /// An insert targeted an id that is already taken.
    #[error("tag id already in use: {0}")]
    DuplicateId(TagId),

    /// A batch was prepared against a revision that is no longer current.
    #[error("write conflict: batch expected revision {expected}, store is at {actual}")]
    Conflict { expected: u64, actual: u64 },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error while reading or writing a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
