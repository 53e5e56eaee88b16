//! AccessStore trait definition.

use async_trait::async_trait;
use rsaccess_domain::{
    Grant, Member, MemberRef, NewNode, Node, NodeId, NodeKind, NodeRef, ResourceRef, User, UserRef,
};

use crate::error::StorageResult;

/// Abstract storage interface for groups, permissions, users, memberships
/// and grants.
///
/// Implementations must be thread-safe (Send + Sync) and support async
/// operations. Every backend must give the same answer to every call for
/// the same sequence of mutations: ids are assigned from 1 upwards per
/// table, listings come back in id order, and reachability follows the
/// current edges.
///
/// Nodes and users are addressed by id or symbolic name. Mutations require
/// the referenced objects to exist. Queries fail only when a *name* does not
/// resolve; an unknown *id* simply answers `false`.
#[async_trait]
pub trait AccessStore: Send + Sync + 'static {
    // Node operations

    /// Creates a group or permission. Fails with `ObjectExists` on a taken
    /// name.
    async fn create_node(&self, kind: NodeKind, fields: NewNode) -> StorageResult<Node>;

    /// Loads a node by id or name.
    async fn load_node(&self, kind: NodeKind, node: &NodeRef) -> StorageResult<Node>;

    /// Deletes a node with its edges (and, for groups, its direct
    /// memberships). Grants naming the node are kept and stop matching.
    async fn delete_node(&self, kind: NodeKind, node: &NodeRef) -> StorageResult<Node>;

    /// All nodes of `kind` in id order.
    async fn list_nodes(&self, kind: NodeKind) -> StorageResult<Vec<Node>>;

    /// The universal group.
    async fn universal_group(&self) -> StorageResult<Node>;

    // Hierarchy operations

    /// Adds `parent -> child`. Returns `false` if the edge already existed.
    /// Rejects self-loops and cycles with `InvalidParameter`.
    async fn add_child(
        &self,
        kind: NodeKind,
        parent: &NodeRef,
        child: &NodeRef,
    ) -> StorageResult<bool>;

    /// Removes `parent -> child`. Returns `false` if the edge was absent.
    async fn remove_child(
        &self,
        kind: NodeKind,
        parent: &NodeRef,
        child: &NodeRef,
    ) -> StorageResult<bool>;

    /// True iff the direct edge `a -> b` exists.
    async fn parent_of(&self, kind: NodeKind, a: &NodeRef, b: &NodeRef) -> StorageResult<bool>;

    /// True iff `a == b` or `a` reaches `b`.
    async fn ancestor_of(&self, kind: NodeKind, a: &NodeRef, b: &NodeRef)
        -> StorageResult<bool>;

    // User operations

    async fn create_user(&self, username: &str) -> StorageResult<User>;

    async fn load_user(&self, user: &UserRef) -> StorageResult<User>;

    /// Deletes a user and all of its memberships.
    async fn delete_user(&self, user: &UserRef) -> StorageResult<User>;

    async fn list_users(&self) -> StorageResult<Vec<User>>;

    // Membership operations

    /// Makes `member` a direct member of `group`. Returns `false` if it
    /// already was.
    async fn add_member(&self, group: &NodeRef, member: &MemberRef) -> StorageResult<bool>;

    /// Drops a direct membership. Returns `false` if there was none.
    async fn remove_member(&self, group: &NodeRef, member: &MemberRef) -> StorageResult<bool>;

    /// True iff `member` belongs to `group` or to a group below it.
    async fn contains(&self, group: &NodeRef, member: &MemberRef) -> StorageResult<bool>;

    /// Direct members of `group`: users by id, then resources by type and id.
    async fn members(&self, group: &NodeRef) -> StorageResult<Vec<Member>>;

    // Grant operations

    /// Stores a grant. Returns `false` if the exact triple was already
    /// stored.
    async fn grant(
        &self,
        permission: &NodeRef,
        grantee: &NodeRef,
        target: Option<&NodeRef>,
    ) -> StorageResult<bool>;

    /// Removes the exact triple. Returns `false` if it was not stored.
    async fn revoke(
        &self,
        permission: &NodeRef,
        grantee: &NodeRef,
        target: Option<&NodeRef>,
    ) -> StorageResult<bool>;

    /// All stored grants ordered by permission, grantee, then target with
    /// untargeted grants first.
    async fn list_grants(&self) -> StorageResult<Vec<Grant>>;

    /// Grants stored directly on `permission`, ordered by grantee then
    /// target. Grants on its ancestors are not included. An unknown id
    /// yields an empty list.
    async fn grants_for_permission(&self, permission: &NodeRef) -> StorageResult<Vec<Grant>>;

    /// The access check: does some stored grant give `user` `permission` on
    /// `resource`?
    async fn test(
        &self,
        permission: &NodeRef,
        user: &UserRef,
        resource: Option<&ResourceRef>,
    ) -> StorageResult<bool>;

    /// Every permission `test` accepts for `user` on `resource`, in id order.
    async fn permissions_of(
        &self,
        user: &UserRef,
        resource: Option<&ResourceRef>,
    ) -> StorageResult<Vec<NodeId>>;
}
