use serde::{Deserialize, Serialize};

/// Offset/limit window over an ordered listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub offset: usize,
    /// `None` means no limit.
    pub limit: Option<usize>,
}

impl Slice {
    /// Everything.
    pub const fn all() -> Self {
        Self {
            offset: 0,
            limit: None,
        }
    }

    pub const fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}
