use crate::error::GateError;
use crate::stage::{AccessRequest, GateContext, GateStage, StageDecision};

/// Denies every mutation while the gate is configured read-only.
pub struct ReadOnlyStage;

impl GateStage for ReadOnlyStage {
    fn name(&self) -> &str {
        "read_only"
    }

    fn evaluate(
        &self,
        request: &AccessRequest<'_>,
        context: &GateContext<'_>,
    ) -> Result<StageDecision, GateError> {
        if context.config.read_only && request.operation.is_mutation() {
            return Ok(StageDecision::Fail {
                reason: format!("tag tree is read-only; {} refused", request.operation),
            });
        }
        Ok(StageDecision::Pass)
    }
}
