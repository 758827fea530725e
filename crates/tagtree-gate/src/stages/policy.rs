use serde::{Deserialize, Serialize};
use tagtree_types::{Tag, TagId};

use crate::actor::{Actor, TagOperation, UserId};
use crate::error::GateError;
use crate::stage::{AccessRequest, GateContext, GateStage, StageDecision};

// ---------------------------------------------------------------------------
// Grants
// ---------------------------------------------------------------------------

/// Restricts a grant to part of the forest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limitation {
    /// Only the given tag, its descendants and their synonyms.
    Subtree(TagId),
}

impl Limitation {
    fn admits(&self, target: &Tag) -> bool {
        match self {
            Self::Subtree(root) => {
                target.path_string.contains(*root) || target.main_tag_id == Some(*root)
            }
        }
    }
}

/// A set of operations, optionally limited to a subtree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub operations: Vec<TagOperation>,
    #[serde(default)]
    pub limitation: Option<Limitation>,
}

impl Grant {
    /// Every operation, everywhere.
    pub fn all() -> Self {
        Self {
            operations: TagOperation::ALL.to_vec(),
            limitation: None,
        }
    }

    pub fn new(operations: impl IntoIterator<Item = TagOperation>) -> Self {
        Self {
            operations: operations.into_iter().collect(),
            limitation: None,
        }
    }

    pub fn within(mut self, root: TagId) -> Self {
        self.limitation = Some(Limitation::Subtree(root));
        self
    }

    /// Whether this grant covers `operation` on `target`.
    ///
    /// A wildcard target never satisfies a limited grant.
    pub fn covers(&self, operation: TagOperation, target: Option<&Tag>) -> bool {
        if !self.operations.contains(&operation) {
            return false;
        }
        match (&self.limitation, target) {
            (None, _) => true,
            (Some(limitation), Some(tag)) => limitation.admits(tag),
            (Some(_), None) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// A named bundle of grants for a set of actors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub applies_to: PolicyScope,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

/// Which actors a policy applies to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyScope {
    /// Every actor, including the anonymous user.
    All,
    User(UserId),
    Role(String),
}

impl Policy {
    /// Full access for the built-in administrator.
    pub fn administrator() -> Self {
        Self {
            id: "administrator".into(),
            name: "Administrator (full access)".into(),
            applies_to: PolicyScope::User(UserId::ADMIN),
            grants: vec![Grant::all()],
        }
    }

    /// Full access for every actor holding `role`.
    pub fn for_role(role: impl Into<String>) -> Self {
        let role = role.into();
        Self {
            id: format!("role-{role}"),
            name: format!("Members of '{role}'"),
            applies_to: PolicyScope::Role(role),
            grants: vec![Grant::all()],
        }
    }

    /// Check whether this policy applies to `actor`.
    pub fn applies(&self, actor: &Actor) -> bool {
        match &self.applies_to {
            PolicyScope::All => true,
            PolicyScope::User(user) => actor.user_id == *user,
            PolicyScope::Role(role) => actor.has_role(role),
        }
    }

    pub fn allows(&self, request: &AccessRequest<'_>) -> bool {
        self.applies(request.actor)
            && self
                .grants
                .iter()
                .any(|g| g.covers(request.operation, request.target))
    }
}

// ---------------------------------------------------------------------------
// PolicyStage
// ---------------------------------------------------------------------------

/// Policy enforcement stage.
///
/// Deny by default: the request passes only if some applicable policy holds
/// a grant covering the operation on the target.
pub struct PolicyStage;

impl GateStage for PolicyStage {
    fn name(&self) -> &str {
        "policy"
    }

    fn evaluate(
        &self,
        request: &AccessRequest<'_>,
        context: &GateContext<'_>,
    ) -> Result<StageDecision, GateError> {
        if let Some(policy) = context.config.policies.iter().find(|p| p.allows(request)) {
            tracing::debug!(policy = %policy.id, operation = %request.operation, "granted by policy");
            return Ok(StageDecision::Pass);
        }
        Ok(StageDecision::Fail {
            reason: format!(
                "user {} may not {} {}",
                request.actor.user_id,
                request.operation,
                request.target_label()
            ),
        })
    }
}
