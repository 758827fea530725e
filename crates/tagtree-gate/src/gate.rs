use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::GateConfig;
use crate::error::GateError;
use crate::stage::{AccessRequest, GateContext, GateStage, StageDecision, StageResult};
use crate::stages::{PolicyStage, ReadOnlyStage};

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Final answer of an authorization check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// The contract the tags service checks every operation against.
pub trait AuthorizationGate: Send + Sync {
    fn check(&self, request: &AccessRequest<'_>) -> Result<Decision, GateError>;
}

// ---------------------------------------------------------------------------
// GateResult
// ---------------------------------------------------------------------------

/// The outcome of running a request through the full pipeline.
#[derive(Clone, Debug)]
pub struct GateResult {
    pub decision: Decision,
    /// Per-stage results in evaluation order.
    pub stage_results: Vec<StageResult>,
    pub elapsed: Duration,
}

impl GateResult {
    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }
}

// ---------------------------------------------------------------------------
// TagGate
// ---------------------------------------------------------------------------

/// A configurable pipeline of stages every access request passes through.
pub struct TagGate {
    stages: Vec<Box<dyn GateStage>>,
    config: GateConfig,
}

impl TagGate {
    /// Create a gate with an empty pipeline.
    ///
    /// An empty pipeline allows everything; use [`Self::add_stage`] or
    /// [`Self::with_default_stages`].
    pub fn new(config: GateConfig) -> Self {
        Self {
            stages: Vec::new(),
            config,
        }
    }

    /// Create a gate with the default pipeline: ReadOnly -> Policy
    pub fn with_default_stages(config: GateConfig) -> Self {
        let mut gate = Self::new(config);
        gate.add_stage(Box::new(ReadOnlyStage));
        gate.add_stage(Box::new(PolicyStage));
        gate
    }

    /// Validate `config` and build the default pipeline.
    pub fn from_config(config: GateConfig) -> Result<Self, GateError> {
        config.validate()?;
        Ok(Self::with_default_stages(config))
    }

    /// Append a stage to the end of the pipeline.
    pub fn add_stage(&mut self, stage: Box<dyn GateStage>) {
        self.stages.push(stage);
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Evaluate a request through the full pipeline.
    ///
    /// The pipeline is **fail-fast**: the first failing stage stops
    /// evaluation and produces a `Deny`. In permissive mode no stage runs.
    pub fn evaluate(&self, request: &AccessRequest<'_>) -> Result<GateResult, GateError> {
        let pipeline_start = Instant::now();

        if self.config.permissive {
            return Ok(GateResult {
                decision: Decision::Allow,
                stage_results: Vec::new(),
                elapsed: pipeline_start.elapsed(),
            });
        }

        let mut context = GateContext::new(&self.config);
        let mut stage_results = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let stage_start = Instant::now();
            let decision = stage.evaluate(request, &context)?;

            let result = StageResult {
                stage_name: stage.name().to_string(),
                passed: decision.is_pass(),
                reason: match &decision {
                    StageDecision::Pass => None,
                    StageDecision::Fail { reason } => Some(reason.clone()),
                },
                elapsed: stage_start.elapsed(),
            };
            stage_results.push(result.clone());
            context.previous_stages.push(result);

            if let StageDecision::Fail { reason } = decision {
                debug!(
                    stage = stage.name(),
                    user = %request.actor.user_id,
                    operation = %request.operation,
                    "access denied"
                );
                return Ok(GateResult {
                    decision: Decision::Deny { reason },
                    stage_results,
                    elapsed: pipeline_start.elapsed(),
                });
            }
        }

        Ok(GateResult {
            decision: Decision::Allow,
            stage_results,
            elapsed: pipeline_start.elapsed(),
        })
    }
}

impl AuthorizationGate for TagGate {
    fn check(&self, request: &AccessRequest<'_>) -> Result<Decision, GateError> {
        self.evaluate(request).map(|result| result.decision)
    }
}

impl Default for TagGate {
    fn default() -> Self {
        Self::with_default_stages(GateConfig::default())
    }
}

impl std::fmt::Debug for TagGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|s| s.name()).collect();
        f.debug_struct("TagGate")
            .field("stages", &names)
            .field("permissive", &self.config.permissive)
            .field("read_only", &self.config.read_only)
            .finish()
    }
}
