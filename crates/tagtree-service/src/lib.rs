//! Hierarchical tag store.
//!
//! [`TagsService`] keeps a forest of keyword tags with materialized paths.
//! Every tag records its parent, its depth (1 for top-level tags) and a
//! path string such as `/8/7/40/`. A synonym is an alias of a main tag that
//! sits beside it: same parent, same depth, no children of its own.
//!
//! Structural operations (move, copy, merge, convert to synonym, delete)
//! walk the affected subtree breadth-first, build the complete set of
//! changed rows and commit them as one atomic batch. Every call is
//! authorized against an [`AuthorizationGate`](tagtree_gate::AuthorizationGate)
//! after existence and structural checks pass.
//!
//! # Quick Start
//!
//! ```rust
//! use tagtree_gate::Actor;
//! use tagtree_service::{TagsConfig, TagsService};
//! use tagtree_store::Fixture;
//! use tagtree_types::TagId;
//!
//! let service = TagsService::in_memory(Fixture::sample().unwrap(), TagsConfig::default()).unwrap();
//! let admin = Actor::admin();
//!
//! let moved = service.move_subtree(&admin, TagId(7), Some(TagId(16))).unwrap();
//! assert_eq!(moved.path_string.to_string(), "/16/7/");
//! assert_eq!(service.load_tag(&admin, TagId(40)).unwrap().depth, 3);
//! assert!(service.verify(&admin).unwrap().is_valid());
//! ```

pub mod config;
pub mod error;
pub mod guard;
pub mod service;
pub mod slice;
pub mod tree;
pub mod verify;

pub use config::{ServiceConfig, TagsConfig};
pub use error::{ServiceError, ServiceResult};
pub use service::TagsService;
pub use slice::Slice;
pub use verify::{VerificationReport, Violation, ViolationKind};

pub use tagtree_gate::{Actor, TagOperation, UserId};
pub use tagtree_types::{ContentRef, Tag, TagCreateStruct, TagId, TagPath, TagUpdateStruct};
