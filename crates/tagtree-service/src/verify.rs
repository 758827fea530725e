use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use tagtree_store::TagStore;
use tagtree_types::{Tag, TagId, TagPath};

use crate::error::ServiceResult;

/// Result of walking the whole forest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub tag_count: usize,
    pub synonym_count: usize,
    pub violations: Vec<Violation>,
}

impl VerificationReport {
    /// Returns `true` if no violation was found.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A single broken invariant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub tag: TagId,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    DanglingParent,
    DanglingMain,
    SynonymChain,
    SynonymWithChildren,
    SynonymMisplaced,
    PathMismatch,
    DepthMismatch,
    DuplicateRemoteId,
    Cycle,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DanglingParent => "dangling parent",
            Self::DanglingMain => "dangling main tag",
            Self::SynonymChain => "synonym chain",
            Self::SynonymWithChildren => "synonym with children",
            Self::SynonymMisplaced => "misplaced synonym",
            Self::PathMismatch => "path mismatch",
            Self::DepthMismatch => "depth mismatch",
            Self::DuplicateRemoteId => "duplicate remote id",
            Self::Cycle => "cycle",
        };
        f.write_str(name)
    }
}

struct Cycle;

/// The path implied by the parent chain of `tag`, or `None` if the chain
/// runs into a missing row.
fn expected_path(tags: &BTreeMap<TagId, Tag>, tag: &Tag) -> Result<Option<TagPath>, Cycle> {
    let mut chain = vec![tag.id];
    let mut seen = HashSet::from([tag.id]);
    let mut cursor = tag.parent_tag_id;
    while let Some(id) = cursor {
        if !seen.insert(id) {
            return Err(Cycle);
        }
        let Some(parent) = tags.get(&id) else {
            return Ok(None);
        };
        chain.push(id);
        cursor = parent.parent_tag_id;
    }

    let mut ids = chain.into_iter().rev();
    Ok(ids
        .next()
        .map(|top| ids.fold(TagPath::root(top), |path, id| path.child(id))))
}

/// Check every row of `store` against the forest invariants.
pub fn verify_forest(store: &dyn TagStore) -> ServiceResult<VerificationReport> {
    let tags: BTreeMap<TagId, Tag> = store.all()?.into_iter().map(|t| (t.id, t)).collect();
    let mut violations = Vec::new();
    let mut remote_ids: HashMap<&str, TagId> = HashMap::new();
    let mut synonym_parents = BTreeSet::new();

    let mut report = |tag: TagId, kind: ViolationKind, description: String| {
        violations.push(Violation {
            tag,
            kind,
            description,
        });
    };

    for tag in tags.values() {
        if let Some(other) = remote_ids.insert(tag.remote_id.as_str(), tag.id) {
            report(
                tag.id,
                ViolationKind::DuplicateRemoteId,
                format!("remote id {} is also used by tag {other}", tag.remote_id),
            );
        }

        if let Some(parent_id) = tag.parent_tag_id {
            match tags.get(&parent_id) {
                None => report(
                    tag.id,
                    ViolationKind::DanglingParent,
                    format!("parent tag {parent_id} does not exist"),
                ),
                Some(parent) if parent.is_synonym() && !tag.is_synonym() => {
                    synonym_parents.insert(parent_id);
                }
                Some(_) => {}
            }
        }

        if let Some(main_id) = tag.main_tag_id {
            match tags.get(&main_id) {
                None => report(
                    tag.id,
                    ViolationKind::DanglingMain,
                    format!("main tag {main_id} does not exist"),
                ),
                Some(main) => {
                    if main.is_synonym() {
                        report(
                            tag.id,
                            ViolationKind::SynonymChain,
                            format!("main tag {main_id} is itself a synonym"),
                        );
                    }
                    if main.parent_tag_id != tag.parent_tag_id || main.depth != tag.depth {
                        report(
                            tag.id,
                            ViolationKind::SynonymMisplaced,
                            format!("synonym does not sit beside main tag {main_id}"),
                        );
                    }
                }
            }
        }

        match expected_path(&tags, tag) {
            Ok(Some(expected)) => {
                if expected != tag.path_string {
                    report(
                        tag.id,
                        ViolationKind::PathMismatch,
                        format!("path is {}, parent chain gives {expected}", tag.path_string),
                    );
                }
                if tag.depth != expected.depth() {
                    report(
                        tag.id,
                        ViolationKind::DepthMismatch,
                        format!("depth is {}, parent chain gives {}", tag.depth, expected.depth()),
                    );
                }
            }
            Ok(None) => {}
            Err(Cycle) => report(
                tag.id,
                ViolationKind::Cycle,
                "parent chain loops back on itself".to_string(),
            ),
        }
    }

    for parent_id in synonym_parents {
        report(
            parent_id,
            ViolationKind::SynonymWithChildren,
            "synonym has children".to_string(),
        );
    }

    Ok(VerificationReport {
        tag_count: tags.len(),
        synonym_count: tags.values().filter(|t| t.is_synonym()).count(),
        violations,
    })
}
