use std::time::Duration;

use tagtree_types::Tag;

use crate::actor::{Actor, TagOperation};
use crate::config::GateConfig;
use crate::error::GateError;

// ---------------------------------------------------------------------------
// AccessRequest
// ---------------------------------------------------------------------------

/// A request to perform `operation` on `target` on behalf of `actor`.
///
/// `target` is `None` for wildcard checks, e.g. creating a top-level tag or
/// listing the roots of the forest.
#[derive(Clone, Copy, Debug)]
pub struct AccessRequest<'a> {
    pub operation: TagOperation,
    pub actor: &'a Actor,
    pub target: Option<&'a Tag>,
}

impl<'a> AccessRequest<'a> {
    pub fn new(operation: TagOperation, actor: &'a Actor, target: Option<&'a Tag>) -> Self {
        Self {
            operation,
            actor,
            target,
        }
    }

    /// Human-readable description of the target, for denial reasons.
    pub fn target_label(&self) -> String {
        match self.target {
            Some(tag) => format!("tag {}", tag.id),
            None => "any tag".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// StageDecision
// ---------------------------------------------------------------------------

/// The outcome of a single gate stage evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageDecision {
    /// The stage passed; proceed to the next stage.
    Pass,
    /// The stage failed; the request is denied.
    Fail { reason: String },
}

impl StageDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }
}

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

/// Recorded result from a completed stage evaluation.
#[derive(Clone, Debug)]
pub struct StageResult {
    pub stage_name: String,
    pub passed: bool,
    /// Populated on failure.
    pub reason: Option<String>,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// GateContext
// ---------------------------------------------------------------------------

/// Contextual information available to every gate stage.
pub struct GateContext<'a> {
    pub config: &'a GateConfig,
    /// Results from stages that have already run in this evaluation.
    pub previous_stages: Vec<StageResult>,
}

impl<'a> GateContext<'a> {
    pub fn new(config: &'a GateConfig) -> Self {
        Self {
            config,
            previous_stages: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// GateStage trait
// ---------------------------------------------------------------------------

/// A single evaluation stage in the gate pipeline.
///
/// Stages are evaluated in order and the first failure ends the evaluation.
/// The trait is object-safe and `Send + Sync` so stages can be stored in a
/// `Vec<Box<dyn GateStage>>`.
pub trait GateStage: Send + Sync {
    /// Human-readable name of this stage (e.g. "read_only", "policy").
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        request: &AccessRequest<'_>,
        context: &GateContext<'_>,
    ) -> Result<StageDecision, GateError>;
}
