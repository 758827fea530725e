use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a user of the host platform.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// The platform's anonymous user.
    pub const ANONYMOUS: UserId = UserId(10);
    /// The platform's built-in administrator.
    pub const ADMIN: UserId = UserId(14);
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The caller on whose behalf an operation runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            roles: Vec::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(UserId::ANONYMOUS)
    }

    pub fn admin() -> Self {
        Self::new(UserId::ADMIN)
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// An operation the gate is asked to authorize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagOperation {
    Read,
    /// Create a tag below the target, or place a subtree there.
    Add,
    Edit,
    EditSynonym,
    AddSynonym,
    MakeSynonym,
    Merge,
    Delete,
    DeleteSynonym,
}

impl TagOperation {
    /// Every operation, in declaration order.
    pub const ALL: [TagOperation; 9] = [
        Self::Read,
        Self::Add,
        Self::Edit,
        Self::EditSynonym,
        Self::AddSynonym,
        Self::MakeSynonym,
        Self::Merge,
        Self::Delete,
        Self::DeleteSynonym,
    ];

    /// Returns `true` for everything except [`TagOperation::Read`].
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Read)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Add => "add",
            Self::Edit => "edit",
            Self::EditSynonym => "edit_synonym",
            Self::AddSynonym => "add_synonym",
            Self::MakeSynonym => "make_synonym",
            Self::Merge => "merge",
            Self::Delete => "delete",
            Self::DeleteSynonym => "delete_synonym",
        }
    }
}

impl fmt::Display for TagOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
