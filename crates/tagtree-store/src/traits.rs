use tagtree_types::{ContentRef, Tag, TagId};

use crate::error::StoreResult;

/// A single row operation inside a [`WriteBatch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert the row, or replace the row with the same id.
    Put(Tag),
    /// Remove the row. Fails the whole batch if the row is missing.
    Delete(TagId),
}

impl WriteOp {
    /// The id of the row this operation touches.
    pub fn id(&self) -> TagId {
        match self {
            Self::Put(tag) => tag.id,
            Self::Delete(id) => *id,
        }
    }
}

/// Ordered set of row operations applied as one unit.
///
/// A batch may carry the store revision its reads were made at. The store
/// then refuses it with [`StoreError::Conflict`] if any other batch was
/// committed in between.
///
/// [`StoreError::Conflict`]: crate::StoreError::Conflict
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
    expected_revision: Option<u64>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, tag: Tag) -> &mut Self {
        self.ops.push(WriteOp::Put(tag));
        self
    }

    pub fn delete(&mut self, id: TagId) -> &mut Self {
        self.ops.push(WriteOp::Delete(id));
        self
    }

    /// Only commit if the store is still at `revision`.
    pub fn expect_revision(&mut self, revision: u64) -> &mut Self {
        self.expected_revision = Some(revision);
        self
    }

    pub fn expected_revision(&self) -> Option<u64> {
        self.expected_revision
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Extend<WriteOp> for WriteBatch {
    fn extend<I: IntoIterator<Item = WriteOp>>(&mut self, iter: I) {
        self.ops.extend(iter);
    }
}

impl FromIterator<WriteOp> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = WriteOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
            expected_revision: None,
        }
    }
}

/// Row-level persistence of tag records.
///
/// All implementations must satisfy these invariants:
/// - `apply` is atomic: either every operation in the batch is committed or
///   none is, and readers never observe a half-applied batch.
/// - After a committed batch no two rows share a remote id.
/// - Every committed batch advances `revision` by one. A batch carrying an
///   expected revision is rejected unless it matches the current one.
/// - `allocate_id` never hands out the same id twice, even if the batch that
///   was meant to use it is never applied.
/// - The backend does not interpret tree structure. Paths, depths and synonym
///   links are maintained by the caller.
pub trait TagStore: Send + Sync {
    /// Read a row by id. Returns `Ok(None)` if it does not exist.
    fn read(&self, id: TagId) -> StoreResult<Option<Tag>>;

    /// Read a row by remote id. Returns `Ok(None)` if no row holds it.
    fn read_by_remote_id(&self, remote_id: &str) -> StoreResult<Option<Tag>>;

    /// Non-synonym rows whose parent is `id`, ordered by keyword then id.
    fn children(&self, id: TagId) -> StoreResult<Vec<Tag>>;

    /// Rows whose main tag is `id`, ordered by keyword then id.
    fn synonyms(&self, id: TagId) -> StoreResult<Vec<Tag>>;

    /// Top-level non-synonym rows, ordered by keyword then id.
    fn roots(&self) -> StoreResult<Vec<Tag>>;

    /// Rows with exactly this keyword, ordered by id.
    fn by_keyword(&self, keyword: &str) -> StoreResult<Vec<Tag>>;

    /// Reserve a fresh id for a row about to be written.
    fn allocate_id(&self) -> StoreResult<TagId>;

    /// Counter of committed batches.
    fn revision(&self) -> StoreResult<u64>;

    /// Apply a batch atomically.
    fn apply(&self, batch: &WriteBatch) -> StoreResult<()>;

    /// Every row, ordered by id.
    fn all(&self) -> StoreResult<Vec<Tag>>;

    /// Number of non-synonym children of `id`.
    ///
    /// Default implementation counts [`TagStore::children`]. Backends may
    /// override with a cheaper query.
    fn children_count(&self, id: TagId) -> StoreResult<usize> {
        Ok(self.children(id)?.len())
    }

    /// Number of synonyms of `id`.
    fn synonym_count(&self, id: TagId) -> StoreResult<usize> {
        Ok(self.synonyms(id)?.len())
    }

    /// Read multiple rows in one call.
    fn read_batch(&self, ids: &[TagId]) -> StoreResult<Vec<Option<Tag>>> {
        ids.iter().map(|id| self.read(*id)).collect()
    }
}

/// Association between tags and the content items tagged with them.
///
/// `reassign` and `remove_all` are idempotent so that a caller may repeat
/// them after a partial failure.
pub trait ContentLinkIndex: Send + Sync {
    /// Content tagged with `tag`, ordered by content id.
    fn list_content_for(&self, tag: TagId) -> StoreResult<Vec<ContentRef>>;

    /// Tag `content` with `tag`. Returns `false` if the link already existed.
    fn link(&self, tag: TagId, content: ContentRef) -> StoreResult<bool>;

    /// Move every link of `from` onto `to`, dropping duplicates.
    fn reassign(&self, from: TagId, to: TagId) -> StoreResult<()>;

    /// Drop every link of `tag`. Returns the number of links removed.
    fn remove_all(&self, tag: TagId) -> StoreResult<usize>;

    /// Every link, ordered by tag id then content id.
    fn all_links(&self) -> StoreResult<Vec<(TagId, ContentRef)>>;

    /// Number of content items tagged with `tag`.
    fn count_content_for(&self, tag: TagId) -> StoreResult<usize> {
        Ok(self.list_content_for(tag)?.len())
    }
}
