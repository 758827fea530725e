//! Persistence contracts for the tag tree.
//!
//! This crate defines the two collaborators the tags service talks to and
//! ships in-memory implementations of both.
//!
//! # Contracts
//!
//! - [`TagStore`] -- row-level reads of tag records by id, remote id, parent
//!   and main tag, plus atomic [`WriteBatch`] application
//! - [`ContentLinkIndex`] -- which content items are tagged with which tag
//!
//! # Backends
//!
//! - [`InMemoryTagStore`] -- `BTreeMap`-based rows with a remote-id index
//! - [`InMemoryContentIndex`] -- per-tag sorted link lists
//! - [`Fixture`] -- JSON snapshots that seed and capture both backends
//!
//! # Design Rules
//!
//! 1. A batch is all-or-nothing. Validation happens before the first row is
//!    touched.
//! 2. Remote ids are unique across all rows after every committed batch.
//! 3. Backends never interpret paths, depths or synonym links.
//! 4. Lock poisoning surfaces as [`StoreError::Poisoned`], never as a panic.

pub mod error;
pub mod fixture;
pub mod links;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fixture::{ContentLink, Fixture};
pub use links::InMemoryContentIndex;
pub use memory::InMemoryTagStore;
pub use traits::{ContentLinkIndex, TagStore, WriteBatch, WriteOp};
