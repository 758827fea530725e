use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::stages::policy::Policy;

/// Configuration for the authorization gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// When `true`, every request is allowed without running any stage.
    pub permissive: bool,
    /// When `true`, every mutation is denied.
    pub read_only: bool,
    /// Policies consulted by the policy stage.
    pub policies: Vec<Policy>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            permissive: false,
            read_only: false,
            policies: vec![Policy::administrator()],
        }
    }
}

impl GateConfig {
    /// Allow everything. Intended for tests and single-user tooling.
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Default::default()
        }
    }

    /// Reject duplicate policy ids and grants without operations.
    pub fn validate(&self) -> Result<(), GateError> {
        let mut seen = HashSet::new();
        for policy in &self.policies {
            if !seen.insert(policy.id.as_str()) {
                return Err(GateError::Config(format!(
                    "duplicate policy id '{}'",
                    policy.id
                )));
            }
            if policy.grants.iter().any(|g| g.operations.is_empty()) {
                return Err(GateError::Config(format!(
                    "policy '{}' has a grant with no operations",
                    policy.id
                )));
            }
        }
        Ok(())
    }
}
