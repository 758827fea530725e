use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tagtree_types::{ContentRef, TagId};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::ContentLinkIndex;

/// In-memory content link index.
///
/// Links are kept per tag, sorted by content id and unique per content id.
pub struct InMemoryContentIndex {
    links: RwLock<BTreeMap<TagId, Vec<ContentRef>>>,
}

impl InMemoryContentIndex {
    pub fn new() -> Self {
        Self {
            links: RwLock::new(BTreeMap::new()),
        }
    }

    /// Total number of links across all tags.
    pub fn len(&self) -> usize {
        self.links
            .read()
            .map(|map| map.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_links(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<TagId, Vec<ContentRef>>>> {
        self.links
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write_links(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<TagId, Vec<ContentRef>>>> {
        self.links
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

/// Insert keeping `items` sorted and unique by content id.
fn insert_sorted(items: &mut Vec<ContentRef>, content: ContentRef) -> bool {
    match items.binary_search_by(|c| c.id.cmp(&content.id)) {
        Ok(_) => false,
        Err(pos) => {
            items.insert(pos, content);
            true
        }
    }
}

impl Default for InMemoryContentIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentLinkIndex for InMemoryContentIndex {
    fn list_content_for(&self, tag: TagId) -> StoreResult<Vec<ContentRef>> {
        Ok(self.read_links()?.get(&tag).cloned().unwrap_or_default())
    }

    fn count_content_for(&self, tag: TagId) -> StoreResult<usize> {
        Ok(self.read_links()?.get(&tag).map_or(0, Vec::len))
    }

    fn link(&self, tag: TagId, content: ContentRef) -> StoreResult<bool> {
        let mut map = self.write_links()?;
        Ok(insert_sorted(map.entry(tag).or_default(), content))
    }

    fn reassign(&self, from: TagId, to: TagId) -> StoreResult<()> {
        if from == to {
            return Ok(());
        }
        let mut map = self.write_links()?;
        let Some(moved) = map.remove(&from) else {
            return Ok(());
        };
        let count = moved.len();
        let target = map.entry(to).or_default();
        for content in moved {
            insert_sorted(target, content);
        }
        debug!(from = %from, to = %to, links = count, "reassigned content links");
        Ok(())
    }

    fn remove_all(&self, tag: TagId) -> StoreResult<usize> {
        let mut map = self.write_links()?;
        Ok(map.remove(&tag).map_or(0, |items| items.len()))
    }

    fn all_links(&self) -> StoreResult<Vec<(TagId, ContentRef)>> {
        let map = self.read_links()?;
        Ok(map
            .iter()
            .flat_map(|(tag, items)| items.iter().map(move |c| (*tag, c.clone())))
            .collect())
    }
}

impl std::fmt::Debug for InMemoryContentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContentIndex")
            .field("link_count", &self.len())
            .finish()
    }
}
