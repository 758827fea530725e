//! Subtree worklists.
//!
//! Each function walks a subtree breadth-first over an explicit queue and
//! returns the rows to write (or the ids to delete). Nothing here touches
//! the store beyond reads and id allocation; callers put the result into a
//! single [`WriteBatch`](tagtree_store::WriteBatch).

use std::collections::VecDeque;

use tagtree_store::TagStore;
use tagtree_types::{generate_remote_id, ModificationDate, Tag, TagId, TagPath};

use crate::error::ServiceResult;

/// Rows for `root` and its whole subtree placed under `new_parent`.
///
/// The first row is the relocated root, stamped with `root_date`. Every
/// other row keeps its modification date. Synonyms of every node follow
/// their main tag.
pub fn relocate(
    store: &dyn TagStore,
    root: &Tag,
    new_parent: Option<&Tag>,
    root_date: ModificationDate,
) -> ServiceResult<Vec<Tag>> {
    let mut moved = root.clone();
    moved.parent_tag_id = new_parent.map(|p| p.id);
    moved.path_string = TagPath::under(new_parent.map(|p| &p.path_string), root.id);
    moved.depth = moved.path_string.depth();
    moved.modification_date = root_date;

    let mut rows = vec![moved.clone()];
    let mut queue = VecDeque::from([moved]);
    while let Some(node) = queue.pop_front() {
        for synonym in store.synonyms(node.id)? {
            rows.push(beside(synonym, &node));
        }
        for child in store.children(node.id)? {
            let child = below(child, &node);
            rows.push(child.clone());
            queue.push_back(child);
        }
    }
    Ok(rows)
}

/// Copies of `root` and its whole subtree placed under `new_parent`.
///
/// Copies get fresh ids, fresh remote ids and the date `now`; parent and
/// main references point at the copies. The first row is the copied root.
pub fn clone_subtree(
    store: &dyn TagStore,
    root: &Tag,
    new_parent: Option<&Tag>,
    now: ModificationDate,
) -> ServiceResult<Vec<Tag>> {
    let mut copy = fresh(store, root, now)?;
    copy.parent_tag_id = new_parent.map(|p| p.id);
    copy.path_string = TagPath::under(new_parent.map(|p| &p.path_string), copy.id);
    copy.depth = copy.path_string.depth();

    let mut rows = vec![copy.clone()];
    let mut queue = VecDeque::from([(root.id, copy)]);
    while let Some((original, copy)) = queue.pop_front() {
        for synonym in store.synonyms(original)? {
            rows.push(beside(fresh(store, &synonym, now)?, &copy));
        }
        for child in store.children(original)? {
            let child_copy = below(fresh(store, &child, now)?, &copy);
            rows.push(child_copy.clone());
            queue.push_back((child.id, child_copy));
        }
    }
    Ok(rows)
}

/// Ids of `root`, its synonyms, every descendant and their synonyms.
pub fn collect_subtree(store: &dyn TagStore, root: &Tag) -> ServiceResult<Vec<TagId>> {
    let mut ids = vec![root.id];
    if root.is_synonym() {
        return Ok(ids);
    }
    let mut queue = VecDeque::from([root.id]);
    while let Some(id) = queue.pop_front() {
        ids.extend(store.synonyms(id)?.iter().map(|t| t.id));
        for child in store.children(id)? {
            ids.push(child.id);
            queue.push_back(child.id);
        }
    }
    Ok(ids)
}

/// Reshape `synonym` to sit beside `main`: same parent, same depth.
pub fn beside(mut synonym: Tag, main: &Tag) -> Tag {
    synonym.main_tag_id = Some(main.id);
    synonym.parent_tag_id = main.parent_tag_id;
    synonym.path_string = main.path_string.sibling(synonym.id);
    synonym.depth = main.depth;
    synonym
}

fn below(mut tag: Tag, parent: &Tag) -> Tag {
    tag.parent_tag_id = Some(parent.id);
    tag.path_string = parent.path_string.child(tag.id);
    tag.depth = tag.path_string.depth();
    tag
}

fn fresh(store: &dyn TagStore, template: &Tag, now: ModificationDate) -> ServiceResult<Tag> {
    let mut tag = template.clone();
    tag.id = store.allocate_id()?;
    tag.remote_id = generate_remote_id();
    tag.modification_date = now;
    Ok(tag)
}
