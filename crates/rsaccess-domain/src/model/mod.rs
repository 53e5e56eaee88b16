//! Access-control model types.
//!
//! This module contains:
//! - Node, user, resource and grant definitions
//! - Reference enums accepting an object, an id or a symbolic name

mod refs;
mod types;

pub use refs::{MemberRef, NodeRef, UserRef};
pub use types::*;
