//! Authorization gate for tag operations.
//!
//! Every read and mutation performed by the tags service is first turned
//! into an [`AccessRequest`] and checked by an [`AuthorizationGate`]. The
//! bundled [`TagGate`] runs a fail-fast pipeline of stages (read-only mode,
//! then policy grants) and produces an allow/deny decision with a per-stage
//! audit trail.
//!
//! # Quick Start
//!
//! ```rust
//! use tagtree_gate::{AccessRequest, Actor, GateConfig, TagGate, TagOperation};
//!
//! let gate = TagGate::with_default_stages(GateConfig::default());
//! let admin = Actor::admin();
//! let request = AccessRequest::new(TagOperation::Add, &admin, None);
//! assert!(gate.evaluate(&request).unwrap().is_allowed());
//!
//! let anonymous = Actor::anonymous();
//! let request = AccessRequest::new(TagOperation::Read, &anonymous, None);
//! assert!(!gate.evaluate(&request).unwrap().is_allowed());
//! ```

pub mod actor;
pub mod config;
pub mod error;
pub mod gate;
pub mod stage;
pub mod stages;

pub use actor::{Actor, TagOperation, UserId};
pub use config::GateConfig;
pub use error::GateError;
pub use gate::{AuthorizationGate, Decision, GateResult, TagGate};
pub use stage::{AccessRequest, GateContext, GateStage, StageDecision, StageResult};
pub use stages::policy::{Grant, Limitation, Policy, PolicyScope, PolicyStage};
pub use stages::read_only::ReadOnlyStage;
