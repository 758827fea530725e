//! The [`Tag`] entity and the structs used to create and update it.

use serde::{Deserialize, Serialize};

use crate::id::TagId;
use crate::path::TagPath;
use crate::temporal::ModificationDate;

/// A node in the tag forest.
///
/// A tag with `main_tag_id` set is a *synonym* of that main tag. Synonyms
/// are leaves: they have no children and no synonyms of their own, and they
/// sit beside their main tag (same parent, same depth).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    /// `None` for top-level tags.
    pub parent_tag_id: Option<TagId>,
    /// `Some(main)` if this tag is a synonym of `main`.
    pub main_tag_id: Option<TagId>,
    pub keyword: String,
    /// 1-based: top-level tags have depth 1.
    pub depth: u32,
    pub path_string: TagPath,
    pub modification_date: ModificationDate,
    pub remote_id: String,
}

impl Tag {
    /// Returns `true` if this tag stands for another tag.
    pub fn is_synonym(&self) -> bool {
        self.main_tag_id.is_some()
    }

    /// Returns `true` if this tag has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_tag_id.is_none()
    }

    /// Returns `true` if `other` is this tag or one of its descendants.
    ///
    /// Only meaningful for non-synonyms; a synonym's path does not contain
    /// its own subtree.
    pub fn encloses(&self, other: &Tag) -> bool {
        other.path_string.is_within(&self.path_string)
    }
}

impl From<&Tag> for TagId {
    fn from(tag: &Tag) -> Self {
        tag.id
    }
}

/// Input for creating a new tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCreateStruct {
    /// `None` creates a top-level tag.
    pub parent_tag_id: Option<TagId>,
    pub keyword: String,
    /// Generated when omitted.
    pub remote_id: Option<String>,
}

impl TagCreateStruct {
    pub fn new(parent_tag_id: Option<TagId>, keyword: impl Into<String>) -> Self {
        Self {
            parent_tag_id,
            keyword: keyword.into(),
            remote_id: None,
        }
    }

    /// Set the remote id.
    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }
}

/// Input for updating a tag. Unset fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagUpdateStruct {
    pub keyword: Option<String>,
    pub remote_id: Option<String>,
}

impl TagUpdateStruct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.keyword.is_none() && self.remote_id.is_none()
    }
}

/// Generate a fresh remote id: 32 lowercase hex characters.
pub fn generate_remote_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}
