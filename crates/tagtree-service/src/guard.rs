//! Structural checks run before any write.
//!
//! Every guard fails with [`ServiceError::InvalidArgument`] naming the
//! offending argument.

use tagtree_store::TagStore;
use tagtree_types::{Tag, TagId};

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};

/// Synonyms cannot take part in structural operations.
pub fn ensure_not_synonym(tag: &Tag, argument: &str) -> ServiceResult<()> {
    match tag.main_tag_id {
        Some(main) => Err(ServiceError::invalid(
            argument,
            format!("tag {} is a synonym of tag {main}", tag.id),
        )),
        None => Ok(()),
    }
}

/// `target` must not be `tag` itself or one of its descendants.
pub fn ensure_outside_subtree(tag: &Tag, target: &Tag, argument: &str) -> ServiceResult<()> {
    if target.id == tag.id {
        return Err(ServiceError::invalid(
            argument,
            format!("tag {} cannot target itself", tag.id),
        ));
    }
    if tag.encloses(target) {
        return Err(ServiceError::invalid(
            argument,
            format!("tag {} is located below tag {}", target.id, tag.id),
        ));
    }
    Ok(())
}

/// Rejects placing `tag` where it already is. `None` stands for the top level.
pub fn ensure_not_parent(tag: &Tag, target: Option<&Tag>) -> ServiceResult<()> {
    let target_id = target.map(|t| t.id);
    if tag.parent_tag_id == target_id {
        let reason = match target_id {
            Some(id) => format!("tag {id} is already the parent of tag {}", tag.id),
            None => format!("tag {} is already a top-level tag", tag.id),
        };
        return Err(ServiceError::invalid("target_parent_tag", reason));
    }
    Ok(())
}

pub fn validate_keyword(keyword: &str, config: &ServiceConfig) -> ServiceResult<()> {
    if keyword.trim().is_empty() {
        return Err(ServiceError::invalid("keyword", "keyword must not be empty"));
    }
    let length = keyword.chars().count();
    if length > config.max_keyword_length {
        return Err(ServiceError::invalid(
            "keyword",
            format!(
                "keyword is {length} characters long, the limit is {}",
                config.max_keyword_length
            ),
        ));
    }
    Ok(())
}

/// `remote_id` must be non-empty and held by no tag other than `owner`.
pub fn ensure_remote_id_free(
    store: &dyn TagStore,
    remote_id: &str,
    owner: Option<TagId>,
) -> ServiceResult<()> {
    if remote_id.trim().is_empty() {
        return Err(ServiceError::invalid("remote_id", "remote id must not be empty"));
    }
    match store.read_by_remote_id(remote_id)? {
        Some(holder) if Some(holder.id) != owner => Err(ServiceError::invalid(
            "remote_id",
            format!("remote id {remote_id} is already used by tag {}", holder.id),
        )),
        _ => Ok(()),
    }
}
