//! References accepted wherever an API takes a node, user or member.
//!
//! Every entity can be named by its object, its integer id or, when it has
//! one, its unique symbolic name. The three forms collapse into these enums
//! and are resolved once at the API boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::types::{Node, NodeId, ResourceRef, User, UserId};
use crate::error::DomainError;

/// A group or permission by id or symbolic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Id(NodeId),
    Name(String),
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        Self::Id(id)
    }
}

impl From<&Node> for NodeRef {
    fn from(node: &Node) -> Self {
        Self::Id(node.id)
    }
}

impl From<&str> for NodeRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for NodeRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Purely numeric text is an id, anything else a name.
impl FromStr for NodeRef {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DomainError::invalid("empty node reference"));
        }
        Ok(match s.parse::<i64>() {
            Ok(id) if s.bytes().all(|b| b.is_ascii_digit()) => Self::Id(NodeId(id)),
            _ => Self::Name(s.to_string()),
        })
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// A user by id or username.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRef {
    Id(UserId),
    Name(String),
}

impl From<UserId> for UserRef {
    fn from(id: UserId) -> Self {
        Self::Id(id)
    }
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        Self::Id(user.id)
    }
}

impl From<&str> for UserRef {
    fn from(username: &str) -> Self {
        Self::Name(username.to_string())
    }
}

impl From<String> for UserRef {
    fn from(username: String) -> Self {
        Self::Name(username)
    }
}

impl FromStr for UserRef {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DomainError::invalid("empty user reference"));
        }
        Ok(match s.parse::<i64>() {
            Ok(id) if s.bytes().all(|b| b.is_ascii_digit()) => Self::Id(UserId(id)),
            _ => Self::Name(s.to_string()),
        })
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// A prospective group member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberRef {
    User(UserRef),
    Resource(ResourceRef),
}

impl From<UserRef> for MemberRef {
    fn from(user: UserRef) -> Self {
        Self::User(user)
    }
}

impl From<&User> for MemberRef {
    fn from(user: &User) -> Self {
        Self::User(user.into())
    }
}

impl From<UserId> for MemberRef {
    fn from(id: UserId) -> Self {
        Self::User(id.into())
    }
}

impl From<ResourceRef> for MemberRef {
    fn from(resource: ResourceRef) -> Self {
        Self::Resource(resource)
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(user) => write!(f, "user {user}"),
            Self::Resource(resource) => write!(f, "resource {resource}"),
        }
    }
}
