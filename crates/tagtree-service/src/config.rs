use std::path::Path;

use serde::{Deserialize, Serialize};
use tagtree_gate::GateConfig;

use crate::error::{ServiceError, ServiceResult};

/// Limits and defaults applied by the tags service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Longest accepted keyword, in characters.
    pub max_keyword_length: usize,
    /// Generate a remote id when `create_tag` is called without one. When
    /// `false` such calls are rejected. Synonyms and copies always receive
    /// generated remote ids.
    pub generate_remote_ids: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_keyword_length: 255,
            generate_remote_ids: true,
        }
    }
}

/// Top-level configuration file: `[service]` and `[gate]` sections.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagsConfig {
    pub service: ServiceConfig,
    pub gate: GateConfig,
}

impl TagsConfig {
    pub fn from_toml_str(source: &str) -> ServiceResult<Self> {
        toml::from_str(source).map_err(|e| ServiceError::Config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }
}
