//! Built-in gate stages.

pub mod policy;
pub mod read_only;

pub use policy::PolicyStage;
pub use read_only::ReadOnlyStage;
