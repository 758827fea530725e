use serde::{Deserialize, Serialize};

use crate::id::ContentId;

/// Reference to a content item tagged with one or more tags.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub id: ContentId,
    /// Display name, as reported by the host repository.
    pub name: String,
}

impl ContentRef {
    pub fn new(id: ContentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
