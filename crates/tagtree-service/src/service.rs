use std::collections::HashSet;
use std::sync::Arc;

use tagtree_gate::{AccessRequest, Actor, AuthorizationGate, Decision, TagGate, TagOperation};
use tagtree_store::{ContentLinkIndex, Fixture, TagStore, WriteBatch, WriteOp};
use tagtree_types::{
    generate_remote_id, ContentRef, ModificationClock, Tag, TagCreateStruct, TagId, TagPath,
    TagUpdateStruct,
};
use tracing::{debug, error, info, warn};

use crate::config::{ServiceConfig, TagsConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::guard;
use crate::slice::Slice;
use crate::tree;
use crate::verify::{self, VerificationReport};

/// The tag tree store.
///
/// Every operation takes the acting [`Actor`] first and re-reads current
/// state from the backend; no lock is held between calls. Checks run in a
/// fixed order: existence, then structure, then authorization. Structural
/// changes are written as one [`WriteBatch`] pinned to the store revision
/// read before the checks, so a call that raced another writer fails with a
/// conflict and leaves no trace.
pub struct TagsService {
    store: Arc<dyn TagStore>,
    links: Arc<dyn ContentLinkIndex>,
    gate: Arc<dyn AuthorizationGate>,
    clock: ModificationClock,
    config: ServiceConfig,
}

impl TagsService {
    pub fn new(
        store: Arc<dyn TagStore>,
        links: Arc<dyn ContentLinkIndex>,
        gate: Arc<dyn AuthorizationGate>,
    ) -> Self {
        Self {
            store,
            links,
            gate,
            clock: ModificationClock::new(),
            config: ServiceConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// A service over in-memory backends seeded from `fixture`, guarded by
    /// a [`TagGate`] built from `config.gate`.
    pub fn in_memory(fixture: Fixture, config: TagsConfig) -> ServiceResult<Self> {
        let (store, links) = fixture.into_backends()?;
        let gate = TagGate::from_config(config.gate)?;
        Ok(Self::new(Arc::new(store), Arc::new(links), Arc::new(gate)).with_config(config.service))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn TagStore {
        self.store.as_ref()
    }

    pub fn links(&self) -> &dyn ContentLinkIndex {
        self.links.as_ref()
    }

    /// Capture the current rows and links.
    pub fn snapshot(&self) -> ServiceResult<Fixture> {
        Ok(Fixture::capture(self.store(), self.links())?)
    }

    // ---- Helpers ----

    fn fetch(&self, id: TagId) -> ServiceResult<Tag> {
        self.store
            .read(id)?
            .ok_or_else(|| ServiceError::not_found(format!("tag {id}")))
    }

    fn fetch_optional(&self, id: Option<TagId>) -> ServiceResult<Option<Tag>> {
        id.map(|id| self.fetch(id)).transpose()
    }

    fn authorize(
        &self,
        actor: &Actor,
        operation: TagOperation,
        target: Option<&Tag>,
    ) -> ServiceResult<()> {
        let request = AccessRequest::new(operation, actor, target);
        match self.gate.check(&request)? {
            Decision::Allow => Ok(()),
            Decision::Deny { reason } => {
                warn!(
                    user = %actor.user_id,
                    operation = %operation,
                    target = %request.target_label(),
                    "access denied"
                );
                Err(ServiceError::Unauthorized { operation, reason })
            }
        }
    }

    /// Apply `batch` only if nothing was committed since `revision`.
    fn commit(&self, revision: u64, batch: &mut WriteBatch) -> ServiceResult<()> {
        batch.expect_revision(revision);
        self.store.apply(batch)?;
        Ok(())
    }

    /// The batch restoring every row `batch` is about to touch.
    fn undo_for(&self, batch: &WriteBatch) -> ServiceResult<WriteBatch> {
        let mut seen = HashSet::new();
        let ids: Vec<TagId> = batch
            .ops()
            .iter()
            .map(WriteOp::id)
            .filter(|id| seen.insert(*id))
            .collect();
        let mut undo = WriteBatch::new();
        for (id, before) in ids.iter().zip(self.store.read_batch(&ids)?) {
            match before {
                Some(row) => undo.put(row),
                None => undo.delete(*id),
            };
        }
        Ok(undo)
    }

    /// Revert a committed batch after its link step failed, then hand back
    /// the link error.
    fn roll_back(
        &self,
        committed_at: u64,
        mut undo: WriteBatch,
        saved_links: &[(TagId, Vec<ContentRef>)],
        cause: ServiceError,
    ) -> ServiceError {
        undo.expect_revision(committed_at + 1);
        if let Err(err) = self.store.apply(&undo) {
            error!(error = %err, cause = %cause, "rollback of tag rows failed");
        }
        for (tag, items) in saved_links {
            for content in items {
                if let Err(err) = self.links.link(*tag, content.clone()) {
                    error!(tag = %tag, error = %err, "restoring content link failed");
                }
            }
        }
        warn!(error = %cause, rows = undo.len(), "rolled back write batch");
        cause
    }

    // ---- Reads ----

    pub fn load_tag(&self, actor: &Actor, id: impl Into<TagId>) -> ServiceResult<Tag> {
        let tag = self.fetch(id.into())?;
        self.authorize(actor, TagOperation::Read, Some(&tag))?;
        debug!(tag = %tag.id, "loaded tag");
        Ok(tag)
    }

    pub fn load_tag_by_remote_id(&self, actor: &Actor, remote_id: &str) -> ServiceResult<Tag> {
        let tag = self
            .store
            .read_by_remote_id(remote_id)?
            .ok_or_else(|| ServiceError::not_found(format!("tag with remote id {remote_id}")))?;
        self.authorize(actor, TagOperation::Read, Some(&tag))?;
        debug!(tag = %tag.id, remote_id, "loaded tag by remote id");
        Ok(tag)
    }

    /// Children of a tag, synonyms excluded, ordered by keyword then id.
    pub fn load_tag_children(&self, actor: &Actor, id: impl Into<TagId>) -> ServiceResult<Vec<Tag>> {
        self.load_tag_children_slice(actor, id, Slice::all())
    }

    pub fn load_tag_children_slice(
        &self,
        actor: &Actor,
        id: impl Into<TagId>,
        slice: Slice,
    ) -> ServiceResult<Vec<Tag>> {
        let tag = self.fetch(id.into())?;
        self.authorize(actor, TagOperation::Read, Some(&tag))?;
        let children = slice.apply(self.store.children(tag.id)?);
        debug!(tag = %tag.id, count = children.len(), "loaded children");
        Ok(children)
    }

    pub fn get_tag_children_count(&self, actor: &Actor, id: impl Into<TagId>) -> ServiceResult<usize> {
        let tag = self.fetch(id.into())?;
        self.authorize(actor, TagOperation::Read, Some(&tag))?;
        Ok(self.store.children_count(tag.id)?)
    }

    /// Synonyms of a tag. Fails if the tag is itself a synonym.
    pub fn load_tag_synonyms(&self, actor: &Actor, id: impl Into<TagId>) -> ServiceResult<Vec<Tag>> {
        self.load_tag_synonyms_slice(actor, id, Slice::all())
    }

    pub fn load_tag_synonyms_slice(
        &self,
        actor: &Actor,
        id: impl Into<TagId>,
        slice: Slice,
    ) -> ServiceResult<Vec<Tag>> {
        let tag = self.fetch(id.into())?;
        guard::ensure_not_synonym(&tag, "tag")?;
        self.authorize(actor, TagOperation::Read, Some(&tag))?;
        let synonyms = slice.apply(self.store.synonyms(tag.id)?);
        debug!(tag = %tag.id, count = synonyms.len(), "loaded synonyms");
        Ok(synonyms)
    }

    pub fn get_tag_synonym_count(&self, actor: &Actor, id: impl Into<TagId>) -> ServiceResult<usize> {
        let tag = self.fetch(id.into())?;
        guard::ensure_not_synonym(&tag, "tag")?;
        self.authorize(actor, TagOperation::Read, Some(&tag))?;
        Ok(self.store.synonym_count(tag.id)?)
    }

    /// Content items tagged with a tag, ordered by content id.
    pub fn get_related_content(
        &self,
        actor: &Actor,
        id: impl Into<TagId>,
    ) -> ServiceResult<Vec<ContentRef>> {
        self.get_related_content_slice(actor, id, Slice::all())
    }

    pub fn get_related_content_slice(
        &self,
        actor: &Actor,
        id: impl Into<TagId>,
        slice: Slice,
    ) -> ServiceResult<Vec<ContentRef>> {
        let tag = self.fetch(id.into())?;
        self.authorize(actor, TagOperation::Read, Some(&tag))?;
        Ok(slice.apply(self.links.list_content_for(tag.id)?))
    }

    pub fn get_related_content_count(
        &self,
        actor: &Actor,
        id: impl Into<TagId>,
    ) -> ServiceResult<usize> {
        let tag = self.fetch(id.into())?;
        self.authorize(actor, TagOperation::Read, Some(&tag))?;
        Ok(self.links.count_content_for(tag.id)?)
    }

    /// Top-level tags, synonyms excluded.
    pub fn load_root_tags(&self, actor: &Actor) -> ServiceResult<Vec<Tag>> {
        self.authorize(actor, TagOperation::Read, None)?;
        Ok(self.store.roots()?)
    }

    /// Tags with exactly this keyword that `actor` may read.
    pub fn load_tags_by_keyword(&self, actor: &Actor, keyword: &str) -> ServiceResult<Vec<Tag>> {
        let mut readable = Vec::new();
        for tag in self.store.by_keyword(keyword)? {
            let request = AccessRequest::new(TagOperation::Read, actor, Some(&tag));
            if self.gate.check(&request)?.is_allowed() {
                readable.push(tag);
            }
        }
        debug!(keyword, count = readable.len(), "loaded tags by keyword");
        Ok(readable)
    }

    /// Walk the whole forest and report broken invariants.
    pub fn verify(&self, actor: &Actor) -> ServiceResult<VerificationReport> {
        self.authorize(actor, TagOperation::Read, None)?;
        verify::verify_forest(self.store())
    }

    // ---- Struct constructors ----

    pub fn new_tag_create_struct(
        &self,
        parent_tag_id: Option<TagId>,
        keyword: impl Into<String>,
    ) -> TagCreateStruct {
        TagCreateStruct::new(parent_tag_id, keyword)
    }

    pub fn new_tag_update_struct(&self) -> TagUpdateStruct {
        TagUpdateStruct::new()
    }

    // ---- Mutations ----

    pub fn create_tag(&self, actor: &Actor, create: TagCreateStruct) -> ServiceResult<Tag> {
        let revision = self.store.revision()?;
        let parent = self.fetch_optional(create.parent_tag_id)?;

        if let Some(parent) = &parent {
            guard::ensure_not_synonym(parent, "parent_tag_id")?;
        }
        guard::validate_keyword(&create.keyword, &self.config)?;
        let remote_id = match create.remote_id {
            Some(remote_id) => {
                guard::ensure_remote_id_free(self.store(), &remote_id, None)?;
                remote_id
            }
            None if self.config.generate_remote_ids => generate_remote_id(),
            None => return Err(ServiceError::invalid("remote_id", "a remote id is required")),
        };

        self.authorize(actor, TagOperation::Add, parent.as_ref())?;

        let id = self.store.allocate_id()?;
        let path_string = TagPath::under(parent.as_ref().map(|p| &p.path_string), id);
        let tag = Tag {
            id,
            parent_tag_id: parent.as_ref().map(|p| p.id),
            main_tag_id: None,
            keyword: create.keyword,
            depth: path_string.depth(),
            path_string,
            modification_date: self.clock.now(),
            remote_id,
        };
        let mut batch = WriteBatch::new();
        batch.put(tag.clone());
        self.commit(revision, &mut batch)?;
        info!(tag = %tag.id, path = %tag.path_string, "created tag");
        Ok(tag)
    }

    /// Change keyword and/or remote id. Never moves the tag.
    pub fn update_tag(
        &self,
        actor: &Actor,
        id: impl Into<TagId>,
        update: TagUpdateStruct,
    ) -> ServiceResult<Tag> {
        let revision = self.store.revision()?;
        let tag = self.fetch(id.into())?;

        if let Some(keyword) = &update.keyword {
            guard::validate_keyword(keyword, &self.config)?;
        }
        if let Some(remote_id) = &update.remote_id {
            guard::ensure_remote_id_free(self.store(), remote_id, Some(tag.id))?;
        }

        let operation = if tag.is_synonym() {
            TagOperation::EditSynonym
        } else {
            TagOperation::Edit
        };
        self.authorize(actor, operation, Some(&tag))?;

        let mut updated = tag.clone();
        if let Some(keyword) = update.keyword {
            updated.keyword = keyword;
        }
        if let Some(remote_id) = update.remote_id {
            updated.remote_id = remote_id;
        }
        updated.modification_date = self.clock.stamp_after(&tag.modification_date);

        let mut batch = WriteBatch::new();
        batch.put(updated.clone());
        self.commit(revision, &mut batch)?;
        info!(tag = %updated.id, "updated tag");
        Ok(updated)
    }

    /// Create a synonym of `main_tag_id`, placed beside it.
    pub fn add_synonym(
        &self,
        actor: &Actor,
        main_tag_id: impl Into<TagId>,
        keyword: impl Into<String>,
    ) -> ServiceResult<Tag> {
        let revision = self.store.revision()?;
        let main = self.fetch(main_tag_id.into())?;
        let keyword = keyword.into();

        guard::ensure_not_synonym(&main, "main_tag_id")?;
        guard::validate_keyword(&keyword, &self.config)?;

        self.authorize(actor, TagOperation::AddSynonym, Some(&main))?;

        let id = self.store.allocate_id()?;
        let synonym = Tag {
            id,
            parent_tag_id: main.parent_tag_id,
            main_tag_id: Some(main.id),
            keyword,
            depth: main.depth,
            path_string: main.path_string.sibling(id),
            modification_date: self.clock.now(),
            remote_id: generate_remote_id(),
        };
        let mut batch = WriteBatch::new();
        batch.put(synonym.clone());
        self.commit(revision, &mut batch)?;
        info!(tag = %synonym.id, main = %main.id, "added synonym");
        Ok(synonym)
    }

    /// Turn `id` into a synonym of `main_tag_id`.
    ///
    /// Children of `id` move below the main tag and synonyms of `id` are
    /// re-pointed to it. The converted tag keeps its id and content links.
    pub fn convert_to_synonym(
        &self,
        actor: &Actor,
        id: impl Into<TagId>,
        main_tag_id: impl Into<TagId>,
    ) -> ServiceResult<Tag> {
        let revision = self.store.revision()?;
        let tag = self.fetch(id.into())?;
        let main = self.fetch(main_tag_id.into())?;

        guard::ensure_not_synonym(&tag, "tag")?;
        guard::ensure_not_synonym(&main, "main_tag")?;
        guard::ensure_outside_subtree(&tag, &main, "main_tag")?;

        self.authorize(actor, TagOperation::MakeSynonym, Some(&tag))?;

        let mut batch = self.adopt(&tag, &main)?;
        let mut converted = tree::beside(tag.clone(), &main);
        converted.modification_date = self.clock.stamp_after(&tag.modification_date);
        batch.put(converted.clone());

        self.commit(revision, &mut batch)?;
        info!(tag = %converted.id, main = %main.id, rows = batch.len(), "converted tag to synonym");
        Ok(converted)
    }

    /// Fold `id` into `target_id`: content links, children and synonyms move
    /// to the target and `id` is deleted.
    ///
    /// If the content links cannot be moved the tag rows are put back.
    pub fn merge_tags(
        &self,
        actor: &Actor,
        id: impl Into<TagId>,
        target_id: impl Into<TagId>,
    ) -> ServiceResult<()> {
        let revision = self.store.revision()?;
        let tag = self.fetch(id.into())?;
        let target = self.fetch(target_id.into())?;

        guard::ensure_not_synonym(&tag, "tag")?;
        guard::ensure_not_synonym(&target, "target_tag")?;
        guard::ensure_outside_subtree(&tag, &target, "target_tag")?;

        self.authorize(actor, TagOperation::Merge, Some(&tag))?;

        let mut batch = self.adopt(&tag, &target)?;
        let mut bumped = target.clone();
        bumped.modification_date = self.clock.stamp_after(&target.modification_date);
        batch.put(bumped).delete(tag.id);

        let undo = self.undo_for(&batch)?;
        let saved_links = vec![(tag.id, self.links.list_content_for(tag.id)?)];
        self.commit(revision, &mut batch)?;
        if let Err(err) = self.links.reassign(tag.id, target.id) {
            return Err(self.roll_back(revision, undo, &saved_links, err.into()));
        }
        info!(tag = %tag.id, target = %target.id, rows = batch.len(), "merged tags");
        Ok(())
    }

    /// Rows that hand the children and synonyms of `from` over to `to`.
    fn adopt(&self, from: &Tag, to: &Tag) -> ServiceResult<WriteBatch> {
        let mut batch = WriteBatch::new();
        for child in self.store.children(from.id)? {
            let stamp = self.clock.stamp_after(&child.modification_date);
            for row in tree::relocate(self.store(), &child, Some(to), stamp)? {
                batch.put(row);
            }
        }
        for synonym in self.store.synonyms(from.id)? {
            let stamp = self.clock.stamp_after(&synonym.modification_date);
            let mut moved = tree::beside(synonym, to);
            moved.modification_date = stamp;
            batch.put(moved);
        }
        Ok(batch)
    }

    /// Deep-copy `id` with its subtree below `target_parent` (`None` for
    /// the top level). Returns the copied root.
    pub fn copy_subtree(
        &self,
        actor: &Actor,
        id: impl Into<TagId>,
        target_parent: Option<TagId>,
    ) -> ServiceResult<Tag> {
        let revision = self.store.revision()?;
        let tag = self.fetch(id.into())?;
        let target = self.fetch_optional(target_parent)?;

        self.check_placement(&tag, target.as_ref())?;

        let source = tree::collect_subtree(self.store(), &tag)?;
        for row in self.store.read_batch(&source)?.iter().flatten() {
            self.authorize(actor, TagOperation::Read, Some(row))?;
        }
        self.authorize(actor, TagOperation::Add, target.as_ref())?;

        let rows = tree::clone_subtree(self.store(), &tag, target.as_ref(), self.clock.now())?;
        let copy = rows[0].clone();
        let mut batch: WriteBatch = rows.into_iter().map(WriteOp::Put).collect();
        self.commit(revision, &mut batch)?;
        info!(tag = %tag.id, copy = %copy.id, rows = batch.len(), "copied subtree");
        Ok(copy)
    }

    /// Move `id` with its subtree below `target_parent` (`None` for the top
    /// level). Only the moved tag's modification date changes.
    pub fn move_subtree(
        &self,
        actor: &Actor,
        id: impl Into<TagId>,
        target_parent: Option<TagId>,
    ) -> ServiceResult<Tag> {
        let revision = self.store.revision()?;
        let tag = self.fetch(id.into())?;
        let target = self.fetch_optional(target_parent)?;

        self.check_placement(&tag, target.as_ref())?;

        self.authorize(actor, TagOperation::Edit, Some(&tag))?;
        self.authorize(actor, TagOperation::Add, target.as_ref())?;

        let stamp = self.clock.stamp_after(&tag.modification_date);
        let rows = tree::relocate(self.store(), &tag, target.as_ref(), stamp)?;
        let moved = rows[0].clone();
        let mut batch: WriteBatch = rows.into_iter().map(WriteOp::Put).collect();
        self.commit(revision, &mut batch)?;
        info!(tag = %moved.id, path = %moved.path_string, rows = batch.len(), "moved subtree");
        Ok(moved)
    }

    fn check_placement(&self, tag: &Tag, target: Option<&Tag>) -> ServiceResult<()> {
        guard::ensure_not_synonym(tag, "tag")?;
        if let Some(target) = target {
            guard::ensure_not_synonym(target, "target_parent_tag")?;
            guard::ensure_outside_subtree(tag, target, "target_parent_tag")?;
        }
        guard::ensure_not_parent(tag, target)
    }

    /// Delete a tag, its synonyms, its descendants and their synonyms, then
    /// drop their content links. If dropping the links fails the rows and
    /// the links already dropped are put back.
    pub fn delete_tag(&self, actor: &Actor, id: impl Into<TagId>) -> ServiceResult<()> {
        let revision = self.store.revision()?;
        let tag = self.fetch(id.into())?;

        let operation = if tag.is_synonym() {
            TagOperation::DeleteSynonym
        } else {
            TagOperation::Delete
        };
        self.authorize(actor, operation, Some(&tag))?;

        let ids = tree::collect_subtree(self.store(), &tag)?;
        let mut batch = WriteBatch::new();
        for id in &ids {
            batch.delete(*id);
        }

        let undo = self.undo_for(&batch)?;
        let mut saved_links = Vec::with_capacity(ids.len());
        for id in &ids {
            saved_links.push((*id, self.links.list_content_for(*id)?));
        }
        self.commit(revision, &mut batch)?;
        for id in &ids {
            if let Err(err) = self.links.remove_all(*id) {
                return Err(self.roll_back(revision, undo, &saved_links, err.into()));
            }
        }
        info!(tag = %tag.id, rows = ids.len(), "deleted subtree");
        Ok(())
    }
}

impl std::fmt::Debug for TagsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagsService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
