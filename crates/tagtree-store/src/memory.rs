use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tagtree_types::{Tag, TagId};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{TagStore, WriteBatch, WriteOp};

/// Rows plus the remote-id index, guarded together.
struct Rows {
    tags: BTreeMap<TagId, Tag>,
    by_remote: HashMap<String, TagId>,
    next_id: u64,
    revision: u64,
}

impl Rows {
    fn bump(&mut self, id: TagId) {
        self.next_id = self.next_id.max(id.get() + 1);
    }

    fn unindex(&mut self, tag: &Tag) {
        if self.by_remote.get(&tag.remote_id) == Some(&tag.id) {
            self.by_remote.remove(&tag.remote_id);
        }
    }

    /// Check the post-state of `batch` without touching any row.
    fn validate(&self, batch: &WriteBatch) -> StoreResult<()> {
        let mut staged: HashMap<TagId, Option<&Tag>> = HashMap::new();
        for op in batch.ops() {
            match op {
                WriteOp::Put(tag) => {
                    staged.insert(tag.id, Some(tag));
                }
                WriteOp::Delete(id) => {
                    let present = match staged.get(id) {
                        Some(row) => row.is_some(),
                        None => self.tags.contains_key(id),
                    };
                    if !present {
                        return Err(StoreError::NotFound(*id));
                    }
                    staged.insert(*id, None);
                }
            }
        }

        let mut claimed: HashMap<&str, TagId> = HashMap::new();
        for (id, row) in &staged {
            let Some(tag) = row else { continue };
            let remote_id = tag.remote_id.as_str();
            if claimed.insert(remote_id, *id).is_some() {
                return Err(StoreError::DuplicateRemoteId(remote_id.to_string()));
            }
            // An untouched row still holding the remote id wins.
            if let Some(owner) = self.by_remote.get(remote_id) {
                if owner != id && !staged.contains_key(owner) {
                    return Err(StoreError::DuplicateRemoteId(remote_id.to_string()));
                }
            }
        }
        Ok(())
    }

    fn commit(&mut self, op: &WriteOp) {
        match op {
            WriteOp::Put(tag) => {
                if let Some(old) = self.tags.insert(tag.id, tag.clone()) {
                    self.unindex(&old);
                }
                self.by_remote.insert(tag.remote_id.clone(), tag.id);
                self.bump(tag.id);
            }
            WriteOp::Delete(id) => {
                if let Some(old) = self.tags.remove(id) {
                    self.unindex(&old);
                }
            }
        }
    }

    fn sorted(&self, filter: impl Fn(&Tag) -> bool) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self.tags.values().filter(|t| filter(*t)).cloned().collect();
        tags.sort_by(keyword_then_id);
        tags
    }
}

fn keyword_then_id(a: &Tag, b: &Tag) -> Ordering {
    a.keyword.cmp(&b.keyword).then(a.id.cmp(&b.id))
}

/// In-memory tag store.
///
/// Intended for tests, the CLI and embedding. Rows and the remote-id index
/// sit behind a single `RwLock`; `apply` holds the write lock while it
/// validates and commits, which serializes batches.
pub struct InMemoryTagStore {
    rows: RwLock<Rows>,
}

impl InMemoryTagStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Rows {
                tags: BTreeMap::new(),
                by_remote: HashMap::new(),
                next_id: 1,
                revision: 0,
            }),
        }
    }

    /// Create a store holding `tags`.
    pub fn from_tags(tags: impl IntoIterator<Item = Tag>) -> StoreResult<Self> {
        let store = Self::new();
        for tag in tags {
            store.insert(tag)?;
        }
        Ok(store)
    }

    /// Insert a row outside of a batch. Fails if the id or the remote id is
    /// already taken.
    pub fn insert(&self, tag: Tag) -> StoreResult<()> {
        let mut rows = self.write_rows()?;
        if rows.tags.contains_key(&tag.id) {
            return Err(StoreError::DuplicateId(tag.id));
        }
        if rows.by_remote.contains_key(&tag.remote_id) {
            return Err(StoreError::DuplicateRemoteId(tag.remote_id));
        }
        rows.commit(&WriteOp::Put(tag));
        rows.revision += 1;
        Ok(())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.tags.len()).unwrap_or(0)
    }

    /// Returns `true` if the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_rows(&self) -> StoreResult<RwLockReadGuard<'_, Rows>> {
        self.rows
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write_rows(&self) -> StoreResult<RwLockWriteGuard<'_, Rows>> {
        self.rows
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for InMemoryTagStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TagStore for InMemoryTagStore {
    fn read(&self, id: TagId) -> StoreResult<Option<Tag>> {
        Ok(self.read_rows()?.tags.get(&id).cloned())
    }

    fn read_by_remote_id(&self, remote_id: &str) -> StoreResult<Option<Tag>> {
        let rows = self.read_rows()?;
        Ok(rows
            .by_remote
            .get(remote_id)
            .and_then(|id| rows.tags.get(id))
            .cloned())
    }

    fn children(&self, id: TagId) -> StoreResult<Vec<Tag>> {
        Ok(self
            .read_rows()?
            .sorted(|t| t.parent_tag_id == Some(id) && !t.is_synonym()))
    }

    fn synonyms(&self, id: TagId) -> StoreResult<Vec<Tag>> {
        Ok(self.read_rows()?.sorted(|t| t.main_tag_id == Some(id)))
    }

    fn roots(&self) -> StoreResult<Vec<Tag>> {
        Ok(self
            .read_rows()?
            .sorted(|t| t.is_root() && !t.is_synonym()))
    }

    fn by_keyword(&self, keyword: &str) -> StoreResult<Vec<Tag>> {
        let rows = self.read_rows()?;
        Ok(rows
            .tags
            .values()
            .filter(|t| t.keyword == keyword)
            .cloned()
            .collect())
    }

    fn allocate_id(&self) -> StoreResult<TagId> {
        let mut rows = self.write_rows()?;
        let id = TagId(rows.next_id);
        rows.next_id += 1;
        Ok(id)
    }

    fn revision(&self) -> StoreResult<u64> {
        Ok(self.read_rows()?.revision)
    }

    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        let mut rows = self.write_rows()?;
        if let Some(expected) = batch.expected_revision() {
            if expected != rows.revision {
                return Err(StoreError::Conflict {
                    expected,
                    actual: rows.revision,
                });
            }
        }
        rows.validate(batch)?;
        for op in batch.ops() {
            rows.commit(op);
        }
        rows.revision += 1;
        debug!(rows = batch.len(), revision = rows.revision, "applied write batch");
        Ok(())
    }

    fn all(&self) -> StoreResult<Vec<Tag>> {
        Ok(self.read_rows()?.tags.values().cloned().collect())
    }
}

impl std::fmt::Debug for InMemoryTagStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTagStore")
            .field("tag_count", &self.len())
            .finish()
    }
}
