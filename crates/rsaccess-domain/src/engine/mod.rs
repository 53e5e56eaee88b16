//! The access-check engine.
//!
//! [`AccessGraph`] composes a group hierarchy (users and resources are both
//! members of groups), a permission hierarchy, direct memberships and the
//! stored grants. Its central predicate is [`AccessGraph::test`]:
//!
//! ```text
//! test(p, u, r) = ∃ (p', g', t') ∈ grants:
//!     ancestor_of(p', p)
//!   ∧ contains(g', u)
//!   ∧ (t' = ∅ ∨ (r ≠ ∅ ∧ contains(t', r)))
//! ```
//!
//! The scan over grants is linear with short-circuit; every check inside it
//! is a breadth-first reachability query over the current edges.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::error::{DomainError, DomainResult};
use crate::grants::GrantSet;
use crate::hierarchy::Hierarchy;
use crate::membership::Membership;
use crate::model::{
    validate_name, validate_username, Grant, Member, MemberRef, NewNode, Node, NodeId, NodeKind,
    NodeRef, ResourceRef, User, UserId, UserRef,
};


/// Symbolic name of the group every other group descends from.
pub const DEFAULT_UNIVERSAL_GROUP: &str = "universal";

/// In-memory groups, permissions, users, memberships and grants.
///
/// Mutations take `&mut self`; wrap the graph in a reader-writer lock to
/// share it between threads.
#[derive(Debug, Clone)]
pub struct AccessGraph {
    groups: Hierarchy,
    universal: NodeId,
    permissions: Hierarchy,
    users: BTreeMap<UserId, User>,
    usernames: HashMap<String, UserId>,
    next_user_id: i64,
    membership: Membership,
    grants: GrantSet,
}

impl Default for AccessGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessGraph {
    /// Creates an empty graph whose universal group is named
    /// [`DEFAULT_UNIVERSAL_GROUP`].
    pub fn new() -> Self {
        Self::from_root(NewNode::named(DEFAULT_UNIVERSAL_GROUP).with_title("Everyone"))
    }

    /// Creates an empty graph with a custom universal group name.
    pub fn with_universal_group(name: &str) -> DomainResult<Self> {
        validate_name("group", name)?;
        Ok(Self::from_root(NewNode::named(name).with_title("Everyone")))
    }

    fn from_root(root: NewNode) -> Self {
        let (groups, universal) = Hierarchy::rooted(NodeKind::Group, root);
        Self {
            groups,
            universal,
            permissions: Hierarchy::new(NodeKind::Permission),
            users: BTreeMap::new(),
            usernames: HashMap::new(),
            next_user_id: 1,
            membership: Membership::new(),
            grants: GrantSet::new(),
        }
    }

    /// Id of the universal group.
    pub fn universal_group(&self) -> NodeId {
        self.universal
    }

    pub fn hierarchy(&self, kind: NodeKind) -> &Hierarchy {
        match kind {
            NodeKind::Group => &self.groups,
            NodeKind::Permission => &self.permissions,
        }
    }

    fn hierarchy_mut(&mut self, kind: NodeKind) -> &mut Hierarchy {
        match kind {
            NodeKind::Group => &mut self.groups,
            NodeKind::Permission => &mut self.permissions,
        }
    }

    pub fn groups(&self) -> &Hierarchy {
        &self.groups
    }

    pub fn permissions(&self) -> &Hierarchy {
        &self.permissions
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    // ---------------------------------------------------------------------
    // Nodes
    // ---------------------------------------------------------------------

    /// Creates a group or permission.
    pub fn create_node(&mut self, kind: NodeKind, fields: NewNode) -> DomainResult<Node> {
        let hierarchy = self.hierarchy_mut(kind);
        let id = hierarchy.create_node(fields)?;
        hierarchy
            .node(id)
            .cloned()
            .ok_or_else(|| DomainError::InternalError {
                message: format!("{kind} {id} vanished after creation"),
            })
    }

    pub fn create_group(&mut self, fields: NewNode) -> DomainResult<Node> {
        self.create_node(NodeKind::Group, fields)
    }

    pub fn create_permission(&mut self, fields: NewNode) -> DomainResult<Node> {
        self.create_node(NodeKind::Permission, fields)
    }

    /// Loads a node by id or name.
    pub fn load_node(&self, kind: NodeKind, node: &NodeRef) -> DomainResult<&Node> {
        self.hierarchy(kind).load(node)
    }

    /// Deletes a node and its edges. Deleting a group also drops its direct
    /// memberships. Grants naming the node stay stored and stop matching.
    pub fn delete_node(&mut self, kind: NodeKind, node: &NodeRef) -> DomainResult<Node> {
        let id = self.hierarchy(kind).resolve(node)?;
        let deleted = self.hierarchy_mut(kind).delete_node(id)?;
        if kind == NodeKind::Group {
            let dropped = self.membership.remove_group(id);
            debug!(group = %id, memberships = dropped, "deleted group");
        }
        Ok(deleted)
    }

    /// Adds the edge `parent -> child`. Returns `false` if it already existed.
    pub fn add_child(
        &mut self,
        kind: NodeKind,
        parent: &NodeRef,
        child: &NodeRef,
    ) -> DomainResult<bool> {
        let hierarchy = self.hierarchy_mut(kind);
        let parent = hierarchy.resolve(parent)?;
        let child = hierarchy.resolve(child)?;
        hierarchy.add_child(parent, child)
    }

    /// Removes the edge `parent -> child`. Returns `false` if it was absent.
    pub fn remove_child(
        &mut self,
        kind: NodeKind,
        parent: &NodeRef,
        child: &NodeRef,
    ) -> DomainResult<bool> {
        let hierarchy = self.hierarchy_mut(kind);
        let parent = hierarchy.resolve(parent)?;
        let child = hierarchy.resolve(child)?;
        Ok(hierarchy.remove_child(parent, child))
    }

    pub fn parent_of(&self, kind: NodeKind, a: &NodeRef, b: &NodeRef) -> DomainResult<bool> {
        let hierarchy = self.hierarchy(kind);
        Ok(hierarchy.parent_of(hierarchy.lookup(a)?, hierarchy.lookup(b)?))
    }

    pub fn ancestor_of(&self, kind: NodeKind, a: &NodeRef, b: &NodeRef) -> DomainResult<bool> {
        let hierarchy = self.hierarchy(kind);
        Ok(hierarchy.ancestor_of(hierarchy.lookup(a)?, hierarchy.lookup(b)?))
    }

    // ---------------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------------

    /// Creates a user. Fails with `ObjectExists` on a taken username.
    pub fn create_user(&mut self, username: &str) -> DomainResult<User> {
        validate_username(username)?;
        if self.usernames.contains_key(username) {
            return Err(DomainError::ObjectExists {
                kind: "user",
                name: username.to_string(),
            });
        }
        let user = User {
            id: UserId(self.next_user_id),
            username: username.to_string(),
        };
        self.next_user_id += 1;
        self.usernames.insert(user.username.clone(), user.id);
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn load_user(&self, user: &UserRef) -> DomainResult<&User> {
        let found = match user {
            UserRef::Id(id) => self.users.get(id),
            UserRef::Name(name) => self.usernames.get(name).and_then(|id| self.users.get(id)),
        };
        found.ok_or_else(|| DomainError::not_found("user", user))
    }

    /// All users in id order.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Deletes a user and every membership it had.
    pub fn delete_user(&mut self, user: &UserRef) -> DomainResult<User> {
        let id = self.load_user(user)?.id;
        self.membership.remove_member_everywhere(&Member::User(id));
        let removed = self
            .users
            .remove(&id)
            .ok_or_else(|| DomainError::not_found("user", id))?;
        self.usernames.remove(&removed.username);
        Ok(removed)
    }

    fn lookup_user(&self, user: &UserRef) -> DomainResult<UserId> {
        match user {
            UserRef::Id(id) => Ok(*id),
            UserRef::Name(_) => self.load_user(user).map(|u| u.id),
        }
    }

    // ---------------------------------------------------------------------
    // Membership
    // ---------------------------------------------------------------------

    fn resolve_member(&self, member: &MemberRef) -> DomainResult<Member> {
        match member {
            MemberRef::User(user) => Ok(Member::User(self.load_user(user)?.id)),
            MemberRef::Resource(resource) => {
                resource.validate()?;
                Ok(Member::Resource(resource.clone()))
            }
        }
    }

    fn lookup_member(&self, member: &MemberRef) -> DomainResult<Member> {
        match member {
            MemberRef::User(user) => Ok(Member::User(self.lookup_user(user)?)),
            MemberRef::Resource(resource) => Ok(Member::Resource(resource.clone())),
        }
    }

    /// Makes `member` a direct member of `group`. Returns `false` if it
    /// already was.
    pub fn add_member(&mut self, group: &NodeRef, member: &MemberRef) -> DomainResult<bool> {
        let group = self.groups.resolve(group)?;
        let member = self.resolve_member(member)?;
        Ok(self.membership.add_member(group, member))
    }

    /// Drops a direct membership. Returns `false` if there was none.
    pub fn remove_member(&mut self, group: &NodeRef, member: &MemberRef) -> DomainResult<bool> {
        let group = self.groups.resolve(group)?;
        let member = self.resolve_member(member)?;
        Ok(self.membership.remove_member(group, &member))
    }

    /// True iff `member` is a direct member of `group` or of a group below it.
    pub fn contains(&self, group: &NodeRef, member: &MemberRef) -> DomainResult<bool> {
        let group = self.groups.lookup(group)?;
        let member = self.lookup_member(member)?;
        Ok(self.membership.contains(&self.groups, group, &member))
    }

    /// Direct members of `group`.
    pub fn members(&self, group: &NodeRef) -> DomainResult<Vec<Member>> {
        let group = self.groups.resolve(group)?;
        Ok(self.membership.members(group))
    }

    // ---------------------------------------------------------------------
    // Grants
    // ---------------------------------------------------------------------

    fn resolve_grant(
        &self,
        permission: &NodeRef,
        grantee: &NodeRef,
        target: Option<&NodeRef>,
    ) -> DomainResult<Grant> {
        let permission = self.permissions.load(permission)?;
        let grantee = self.groups.resolve(grantee)?;
        let target = target.map(|t| self.groups.resolve(t)).transpose()?;
        if target.is_some() && !permission.domain.is_resource_scoped() {
            return Err(DomainError::invalid(format!(
                "permission {} is in domain '{}' and cannot be granted on a target group",
                permission.label(),
                permission.domain
            )));
        }
        Ok(Grant::new(permission.id, grantee, target))
    }

    /// Stores the grant. Returns `false` if the exact triple was already
    /// stored.
    pub fn grant(
        &mut self,
        permission: &NodeRef,
        grantee: &NodeRef,
        target: Option<&NodeRef>,
    ) -> DomainResult<bool> {
        let grant = self.resolve_grant(permission, grantee, target)?;
        Ok(self.grants.insert(grant))
    }

    /// Removes the exact triple. Returns `false` if it was not stored.
    pub fn revoke(
        &mut self,
        permission: &NodeRef,
        grantee: &NodeRef,
        target: Option<&NodeRef>,
    ) -> DomainResult<bool> {
        let permission = self.permissions.resolve(permission)?;
        let grantee = self.groups.resolve(grantee)?;
        let target = target.map(|t| self.groups.resolve(t)).transpose()?;
        Ok(self.grants.remove(&Grant::new(permission, grantee, target)))
    }

    /// All stored grants in triple order.
    pub fn grants(&self) -> impl Iterator<Item = &Grant> {
        self.grants.iter()
    }

    /// Grants stored directly on `permission`, ordered by grantee then
    /// target. An unknown id yields an empty list.
    pub fn grants_for_permission(&self, permission: &NodeRef) -> DomainResult<Vec<Grant>> {
        let permission = self.permissions.lookup(permission)?;
        Ok(self.grants.for_permission(permission).copied().collect())
    }

    /// Whether some stored grant implies `permission` for `user` on
    /// `resource`.
    ///
    /// A grant with no target matches whether or not a resource is given; a
    /// grant with a target never matches a check without a resource.
    pub fn test(
        &self,
        permission: &NodeRef,
        user: &UserRef,
        resource: Option<&ResourceRef>,
    ) -> DomainResult<bool> {
        let permission = self.permissions.lookup(permission)?;
        let user = Member::User(self.lookup_user(user)?);
        let resource = resource.cloned().map(Member::Resource);
        let allowed = self
            .grants
            .iter()
            .any(|grant| self.grant_matches(grant, permission, &user, resource.as_ref()));
        debug!(
            permission = %permission,
            user = %user,
            resource = ?resource,
            allowed,
            "access check"
        );
        Ok(allowed)
    }

    fn grant_matches(
        &self,
        grant: &Grant,
        permission: NodeId,
        user: &Member,
        resource: Option<&Member>,
    ) -> bool {
        self.permissions.ancestor_of(grant.permission, permission)
            && self.grant_applies(grant, user, resource)
    }

    /// The grantee and target half of a match, independent of permission.
    fn grant_applies(&self, grant: &Grant, user: &Member, resource: Option<&Member>) -> bool {
        if !self.membership.contains(&self.groups, grant.grantee, user) {
            return false;
        }
        match (grant.target, resource) {
            (None, _) => true,
            (Some(target), Some(resource)) => {
                self.membership.contains(&self.groups, target, resource)
            }
            (Some(_), None) => false,
        }
    }

    /// Every permission `test` accepts for `user` on `resource`, in id order.
    pub fn permissions_of(
        &self,
        user: &UserRef,
        resource: Option<&ResourceRef>,
    ) -> DomainResult<Vec<NodeId>> {
        let user = Member::User(self.lookup_user(user)?);
        let resource = resource.cloned().map(Member::Resource);
        let mut found = BTreeSet::new();
        for grant in self.grants.iter() {
            if found.contains(&grant.permission) {
                continue;
            }
            let granted = self.grant_applies(grant, &user, resource.as_ref());
            if granted {
                found.extend(self.permissions.descendants(grant.permission));
            }
        }
        Ok(found.into_iter().collect())
    }
}
