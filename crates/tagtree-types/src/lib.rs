//! Foundation types for tagtree.
//!
//! This crate provides the value types shared by every other tagtree crate:
//! the [`Tag`] entity itself, its identifiers, the materialized [`TagPath`],
//! and the [`ModificationDate`] stamps that order a tag's revisions.
//!
//! # Key Types
//!
//! - [`Tag`] -- a node in the tag forest, either a normal tag or a synonym
//! - [`TagId`] / [`ContentId`] -- opaque numeric identifiers
//! - [`TagPath`] -- materialized ancestor path such as `/8/7/40/`
//! - [`ModificationDate`] -- hybrid timestamp, totally ordered
//! - [`ModificationClock`] -- hands out strictly increasing dates
//! - [`TagCreateStruct`] / [`TagUpdateStruct`] -- mutation inputs

pub mod content;
pub mod error;
pub mod id;
pub mod path;
pub mod tag;
pub mod temporal;

pub use content::ContentRef;
pub use error::TypeError;
pub use id::{ContentId, TagId};
pub use path::TagPath;
pub use tag::{generate_remote_id, Tag, TagCreateStruct, TagUpdateStruct};
pub use temporal::{ModificationClock, ModificationDate};
