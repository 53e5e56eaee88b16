//! rsaccess-domain: Core access-control domain logic
//!
//! This crate contains the synchronous core of the access-control system:
//! - Obfuscated resource identifiers
//! - Group and permission hierarchies
//! - Direct memberships of users and resources
//! - Grants and the access check
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsaccess-domain                │
//! ├─────────────────────────────────────────────┤
//! │  resource_id/ - Checksummed id encoding     │
//! │  model/       - Nodes, users, references    │
//! │  hierarchy/   - DAG with implicit root      │
//! │  membership/  - Direct member index         │
//! │  grants/      - Stored grant triples        │
//! │  engine/      - AccessGraph and test()      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Architecture Decisions
//!
//! - Reachability is computed on demand by breadth-first search; no closure
//!   is cached, so every query reflects the current edges.
//! - The universal group is an ancestor of every group without stored edges.
//! - Edges that would close a cycle are rejected.
//! - Queries referencing an unknown id answer `false`; an unknown symbolic
//!   name is an error.

pub mod engine;
pub mod error;
pub mod grants;
pub mod hierarchy;
pub mod membership;
pub mod model;
pub mod resource_id;

// Re-export commonly used types at the crate root
pub use engine::{AccessGraph, DEFAULT_UNIVERSAL_GROUP};
pub use error::{DomainError, DomainResult, ErrorKind};
pub use hierarchy::Hierarchy;
pub use model::{
    Domain, Grant, Member, MemberRef, NewNode, Node, NodeId, NodeKind, NodeRef, ResourceRef, User,
    UserId, UserRef,
};
pub use resource_id::ResourceId;
