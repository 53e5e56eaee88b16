//! Core type definitions for the access-control model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::resource_id::{self, ResourceId};

/// Surrogate id of a group or permission node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Surrogate id of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which hierarchy a node lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Group,
    Permission,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Permission => "permission",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(Self::Group),
            "permission" => Ok(Self::Permission),
            other => Err(DomainError::invalid(format!("unknown node kind '{other}'"))),
        }
    }
}

/// Partition label fixed at node creation.
///
/// A permission in the `none` domain is not resource-scoped: grants of it
/// never carry a target group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    #[default]
    Any,
    None,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::None => "none",
        }
    }

    pub fn is_resource_scoped(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(Self::Any),
            "none" => Ok(Self::None),
            other => Err(DomainError::invalid(format!("unknown domain '{other}'"))),
        }
    }
}

/// A group or permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Symbolic name, unique within `kind`.
    pub name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub domain: Domain,
}

impl Node {
    /// Name if the node has one, otherwise its id.
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// Fields of a node about to be created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewNode {
    pub name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub domain: Domain,
}

impl NewNode {
    /// A named node whose title defaults to its name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name: Some(name),
            description: None,
            domain: Domain::Any,
        }
    }

    /// An anonymous node, reachable only by id.
    pub fn untitled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }
}

/// Checks a symbolic name: non-empty, no surrounding whitespace, and not
/// purely numeric so textual references stay unambiguous.
pub fn validate_name(kind: &str, name: &str) -> DomainResult<()> {
    if name.is_empty() {
        return Err(DomainError::invalid(format!("{kind} name cannot be empty")));
    }
    if name.trim() != name {
        return Err(DomainError::invalid(format!(
            "{kind} name '{name}' has surrounding whitespace"
        )));
    }
    if name.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DomainError::invalid(format!(
            "{kind} name '{name}' cannot be purely numeric"
        )));
    }
    Ok(())
}

/// Checks a username. Besides the symbolic-name rules, a username may not
/// have the shape of a prefixed resource id, since textual member
/// references treat that shape as a resource.
pub fn validate_username(name: &str) -> DomainResult<()> {
    validate_name("user", name)?;
    if resource_id::parse(name).is_ok() {
        return Err(DomainError::invalid(format!(
            "user name '{name}' reads as a resource id"
        )));
    }
    Ok(())
}

/// A user. Credentials live elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

/// A catalogued resource: a resource type plus its surrogate id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_type: String,
    pub id: i64,
}

impl ResourceRef {
    pub fn new(resource_type: impl Into<String>, id: i64) -> Self {
        Self {
            resource_type: resource_type.into(),
            id,
        }
    }

    /// Decodes a prefixed resource id such as `cat-2f7ce362`.
    pub fn from_resource_id(value: &str) -> DomainResult<Self> {
        let (resource_type, id) = resource_id::parse(value)?;
        Ok(Self { resource_type, id })
    }

    /// Encodes this resource as a prefixed resource id.
    pub fn resource_id(&self) -> DomainResult<String> {
        resource_id::encode(self.id, Some(&self.resource_type))
    }

    /// Checks the resource type is a valid identifier and the id is not
    /// negative.
    pub fn validate(&self) -> DomainResult<()> {
        resource_id::validate_prefix(&self.resource_type)?;
        if self.id < 0 {
            return Err(DomainError::invalid(format!(
                "resource id {} cannot be negative",
                self.id
            )));
        }
        Ok(())
    }
}

impl TryFrom<ResourceId> for ResourceRef {
    type Error = DomainError;

    fn try_from(value: ResourceId) -> Result<Self, Self::Error> {
        let resource_type = value.resource_type.ok_or_else(|| {
            DomainError::invalid(format!(
                "resource id for {} carries no resource type",
                value.id
            ))
        })?;
        Ok(Self::new(resource_type, value.id))
    }
}

impl FromStr for ResourceRef {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_resource_id(s)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)
    }
}

/// A leaf entity that can be a direct member of groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Member {
    User(UserId),
    Resource(ResourceRef),
}

impl From<UserId> for Member {
    fn from(id: UserId) -> Self {
        Self::User(id)
    }
}

impl From<&User> for Member {
    fn from(user: &User) -> Self {
        Self::User(user.id)
    }
}

impl From<ResourceRef> for Member {
    fn from(resource: ResourceRef) -> Self {
        Self::Resource(resource)
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Resource(resource) => write!(f, "{resource}"),
        }
    }
}

/// A stored access grant: `permission` (and everything below it) is granted
/// to members of `grantee` (and everything below it) on resources contained
/// in `target`, or on any resource when `target` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grant {
    pub permission: NodeId,
    pub grantee: NodeId,
    pub target: Option<NodeId>,
}

impl Grant {
    pub fn new(permission: NodeId, grantee: NodeId, target: Option<NodeId>) -> Self {
        Self {
            permission,
            grantee,
            target,
        }
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            Some(target) => write!(
                f,
                "permission {} to group {} on group {}",
                self.permission, self.grantee, target
            ),
            None => write!(f, "permission {} to group {}", self.permission, self.grantee),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_parse_and_display() {
        assert_eq!("any".parse::<Domain>().unwrap(), Domain::Any);
        assert_eq!("none".parse::<Domain>().unwrap(), Domain::None);
        assert!("some".parse::<Domain>().is_err());
        assert_eq!(Domain::None.to_string(), "none");
        assert!(Domain::Any.is_resource_scoped());
        assert!(!Domain::None.is_resource_scoped());
    }

    #[test]
    fn test_new_node_named_defaults_title() {
        let fields = NewNode::named("editors").with_description("People who edit");
        assert_eq!(fields.name.as_deref(), Some("editors"));
        assert_eq!(fields.title, "editors");
        assert_eq!(fields.domain, Domain::Any);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("group", "editors").is_ok());
        assert!(validate_name("group", "").is_err());
        assert!(validate_name("group", " editors").is_err());
        assert!(validate_name("group", "42").is_err());
        assert!(validate_name("group", "g42").is_ok());
    }

    #[test]
    fn test_resource_ref_from_resource_id() {
        let resource = ResourceRef::from_resource_id("cat-2f7ce362").unwrap();
        assert_eq!(resource, ResourceRef::new("cat", 1000));
        assert_eq!(resource.resource_id().unwrap(), "cat-2f7ce362");
        assert!(ResourceRef::from_resource_id("2f7ce362").is_err());
    }

    #[test]
    fn test_untyped_resource_id_is_not_a_resource() {
        assert!(ResourceRef::try_from(ResourceId::new(1000)).is_err());
        assert_eq!(
            ResourceRef::try_from(ResourceId::typed("cat", 7)).unwrap(),
            ResourceRef::new("cat", 7)
        );
    }
}
