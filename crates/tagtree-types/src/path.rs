//! Materialized tag paths.
//!
//! A [`TagPath`] lists the ids from the top of the forest down to a tag,
//! ending with the tag's own id. Its string form is the familiar
//! `/8/7/40/`. The path is a projection of the `parent_tag_id` chain: it is
//! only ever built from other paths (`root`, `child`, `sibling`) and never
//! edited as a substring.
//!
//! Synonyms carry *sibling-shaped* paths: the parent path of their main tag
//! followed by their own id.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::TagId;

/// Materialized ancestor path of a tag.
///
/// Invariant: never empty. The number of ids equals the tag's depth.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagPath(Vec<TagId>);

impl TagPath {
    /// Path of a top-level tag.
    pub fn root(id: TagId) -> Self {
        Self(vec![id])
    }

    /// Path of a tag placed directly below the tag owning `self`.
    pub fn child(&self, id: TagId) -> Self {
        let mut ids = Vec::with_capacity(self.0.len() + 1);
        ids.extend_from_slice(&self.0);
        ids.push(id);
        Self(ids)
    }

    /// Path of a tag placed beside the tag owning `self` (same parent).
    pub fn sibling(&self, id: TagId) -> Self {
        match self.parent() {
            Some(parent) => parent.child(id),
            None => Self::root(id),
        }
    }

    /// Path under an optional parent path; `None` places the tag at the top.
    pub fn under(parent: Option<&TagPath>, id: TagId) -> Self {
        match parent {
            Some(parent) => parent.child(id),
            None => Self::root(id),
        }
    }

    /// Path of the parent tag, or `None` for a top-level tag.
    pub fn parent(&self) -> Option<TagPath> {
        if self.0.len() > 1 {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        } else {
            None
        }
    }

    /// Parse the `/a/b/c/` string form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidPath {
            path: s.to_string(),
            reason: reason.to_string(),
        };

        let inner = s
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
            .ok_or_else(|| invalid("must start and end with '/'"))?;
        if inner.is_empty() {
            return Err(invalid("path has no segments"));
        }

        let ids = inner
            .split('/')
            .map(|segment| {
                segment
                    .parse::<TagId>()
                    .map_err(|_| invalid(&format!("bad segment {segment:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(ids))
    }

    /// The ids on this path, top-most first.
    pub fn ids(&self) -> &[TagId] {
        &self.0
    }

    /// Number of ids on the path. Equals the owning tag's depth.
    pub fn depth(&self) -> u32 {
        self.0.len() as u32
    }

    /// The last id on the path (the owning tag for non-synonyms).
    pub fn last(&self) -> TagId {
        // never empty, see the type invariant
        self.0[self.0.len() - 1]
    }

    /// Returns `true` if `id` appears anywhere on the path.
    pub fn contains(&self, id: TagId) -> bool {
        self.0.contains(&id)
    }

    /// Returns `true` if `self` equals `ancestor` or lies below it.
    pub fn is_within(&self, ancestor: &TagPath) -> bool {
        self.0.starts_with(&ancestor.0)
    }
}

impl fmt::Debug for TagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagPath({self})")
    }
}

impl fmt::Display for TagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("/")?;
        for id in &self.0 {
            write!(f, "{id}/")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for TagPath {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TagPath> for String {
    fn from(path: TagPath) -> Self {
        path.to_string()
    }
}
