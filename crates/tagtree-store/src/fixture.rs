//! JSON snapshots of a tag forest and its content links.
//!
//! A snapshot looks like:
//!
//! ```json
//! {
//!   "tags": [ { "id": 8, "parent_tag_id": null, "main_tag_id": null, ... } ],
//!   "content": [ { "tag_id": 16, "content": { "id": 57, "name": "Home" } } ]
//! }
//! ```
//!
//! Snapshots are loaded verbatim: the backends do not check tree structure,
//! so a hand-edited snapshot should be checked with the service's `verify`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tagtree_types::{ContentRef, Tag, TagId};
use tracing::debug;

use crate::error::StoreResult;
use crate::links::InMemoryContentIndex;
use crate::memory::InMemoryTagStore;
use crate::traits::{ContentLinkIndex, TagStore};

const SAMPLE: &str = include_str!("../fixtures/sample.json");

/// One tag to content association.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentLink {
    pub tag_id: TagId,
    pub content: ContentRef,
}

/// Serializable snapshot of a tag store and a content link index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub content: Vec<ContentLink>,
}

impl Fixture {
    /// The bundled sample forest.
    pub fn sample() -> StoreResult<Self> {
        Self::from_json_str(SAMPLE)
    }

    pub fn from_json_str(json: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let fixture = Self::from_json_str(&json)?;
        debug!(path = %path.display(), tags = fixture.tags.len(), "loaded fixture");
        Ok(fixture)
    }

    pub fn to_json_string(&self) -> StoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the snapshot as pretty-printed JSON.
    pub fn write_to_path(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let mut json = self.to_json_string()?;
        json.push('\n');
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Build in-memory backends holding this snapshot.
    pub fn into_backends(self) -> StoreResult<(InMemoryTagStore, InMemoryContentIndex)> {
        let store = InMemoryTagStore::from_tags(self.tags)?;
        let links = InMemoryContentIndex::new();
        for link in self.content {
            links.link(link.tag_id, link.content)?;
        }
        Ok((store, links))
    }

    /// Snapshot the current state of a pair of backends.
    pub fn capture(store: &dyn TagStore, links: &dyn ContentLinkIndex) -> StoreResult<Self> {
        let tags = store.all()?;
        let content = links
            .all_links()?
            .into_iter()
            .map(|(tag_id, content)| ContentLink { tag_id, content })
            .collect();
        Ok(Self { tags, content })
    }
}
