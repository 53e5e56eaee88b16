//! In-memory storage implementation.
//!
//! Wraps a single [`AccessGraph`] in a reader-writer lock. Every mutation
//! holds the write half for its whole duration and every query holds the
//! read half, so each call observes a consistent graph.

use std::sync::Arc;

use async_trait::async_trait;
use rsaccess_domain::{
    AccessGraph, Grant, Member, MemberRef, NewNode, Node, NodeId, NodeKind, NodeRef, ResourceRef,
    User, UserRef,
};
use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::StorageResult;
use crate::traits::AccessStore;

/// In-memory implementation of AccessStore.
///
/// # Performance Characteristics
///
/// - **Node, user and membership writes**: O(log N)
/// - **Edge insert**: O(V + E) for the cycle check
/// - **ancestor_of / contains**: O(V + E) breadth-first search
/// - **test**: O(G × (V + E)) with short-circuit on the first matching grant
#[derive(Debug, Default)]
pub struct MemoryAccessStore {
    graph: RwLock<AccessGraph>,
}

impl MemoryAccessStore {
    /// Creates a new in-memory store with the default universal group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Creates a store whose universal group has a custom name.
    pub fn with_universal_group(name: &str) -> StorageResult<Self> {
        Ok(Self::from_graph(AccessGraph::with_universal_group(name)?))
    }

    /// Creates a store over an existing graph.
    pub fn from_graph(graph: AccessGraph) -> Self {
        Self {
            graph: RwLock::new(graph),
        }
    }

    /// Copies the current graph out of the store.
    pub async fn snapshot(&self) -> AccessGraph {
        self.graph.read().await.clone()
    }
}

#[async_trait]
impl AccessStore for MemoryAccessStore {
    #[instrument(skip(self, node), fields(name = ?node.name))]
    async fn create_node(&self, kind: NodeKind, node: NewNode) -> StorageResult<Node> {
        Ok(self.graph.write().await.create_node(kind, node)?)
    }

    async fn load_node(&self, kind: NodeKind, node: &NodeRef) -> StorageResult<Node> {
        Ok(self.graph.read().await.load_node(kind, node)?.clone())
    }

    #[instrument(skip(self))]
    async fn delete_node(&self, kind: NodeKind, node: &NodeRef) -> StorageResult<Node> {
        Ok(self.graph.write().await.delete_node(kind, node)?)
    }

    async fn list_nodes(&self, kind: NodeKind) -> StorageResult<Vec<Node>> {
        let graph = self.graph.read().await;
        Ok(graph.hierarchy(kind).nodes().cloned().collect())
    }

    async fn universal_group(&self) -> StorageResult<Node> {
        let graph = self.graph.read().await;
        let root = NodeRef::Id(graph.universal_group());
        Ok(graph.load_node(NodeKind::Group, &root)?.clone())
    }

    #[instrument(skip(self))]
    async fn add_child(
        &self,
        kind: NodeKind,
        parent: &NodeRef,
        child: &NodeRef,
    ) -> StorageResult<bool> {
        Ok(self.graph.write().await.add_child(kind, parent, child)?)
    }

    #[instrument(skip(self))]
    async fn remove_child(
        &self,
        kind: NodeKind,
        parent: &NodeRef,
        child: &NodeRef,
    ) -> StorageResult<bool> {
        Ok(self.graph.write().await.remove_child(kind, parent, child)?)
    }

    async fn parent_of(&self, kind: NodeKind, a: &NodeRef, b: &NodeRef) -> StorageResult<bool> {
        Ok(self.graph.read().await.parent_of(kind, a, b)?)
    }

    async fn ancestor_of(
        &self,
        kind: NodeKind,
        a: &NodeRef,
        b: &NodeRef,
    ) -> StorageResult<bool> {
        Ok(self.graph.read().await.ancestor_of(kind, a, b)?)
    }

    #[instrument(skip(self))]
    async fn create_user(&self, username: &str) -> StorageResult<User> {
        Ok(self.graph.write().await.create_user(username)?)
    }

    async fn load_user(&self, user: &UserRef) -> StorageResult<User> {
        Ok(self.graph.read().await.load_user(user)?.clone())
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, user: &UserRef) -> StorageResult<User> {
        Ok(self.graph.write().await.delete_user(user)?)
    }

    async fn list_users(&self) -> StorageResult<Vec<User>> {
        Ok(self.graph.read().await.users().cloned().collect())
    }

    #[instrument(skip(self))]
    async fn add_member(&self, group: &NodeRef, member: &MemberRef) -> StorageResult<bool> {
        Ok(self.graph.write().await.add_member(group, member)?)
    }

    #[instrument(skip(self))]
    async fn remove_member(&self, group: &NodeRef, member: &MemberRef) -> StorageResult<bool> {
        Ok(self.graph.write().await.remove_member(group, member)?)
    }

    async fn contains(&self, group: &NodeRef, member: &MemberRef) -> StorageResult<bool> {
        Ok(self.graph.read().await.contains(group, member)?)
    }

    async fn members(&self, group: &NodeRef) -> StorageResult<Vec<Member>> {
        Ok(self.graph.read().await.members(group)?)
    }

    #[instrument(skip(self))]
    async fn grant(
        &self,
        permission: &NodeRef,
        grantee: &NodeRef,
        target: Option<&NodeRef>,
    ) -> StorageResult<bool> {
        Ok(self.graph.write().await.grant(permission, grantee, target)?)
    }

    #[instrument(skip(self))]
    async fn revoke(
        &self,
        permission: &NodeRef,
        grantee: &NodeRef,
        target: Option<&NodeRef>,
    ) -> StorageResult<bool> {
        Ok(self.graph.write().await.revoke(permission, grantee, target)?)
    }

    async fn list_grants(&self) -> StorageResult<Vec<Grant>> {
        Ok(self.graph.read().await.grants().copied().collect())
    }

    async fn grants_for_permission(&self, permission: &NodeRef) -> StorageResult<Vec<Grant>> {
        Ok(self.graph.read().await.grants_for_permission(permission)?)
    }

    async fn test(
        &self,
        permission: &NodeRef,
        user: &UserRef,
        resource: Option<&ResourceRef>,
    ) -> StorageResult<bool> {
        Ok(self.graph.read().await.test(permission, user, resource)?)
    }

    async fn permissions_of(
        &self,
        user: &UserRef,
        resource: Option<&ResourceRef>,
    ) -> StorageResult<Vec<NodeId>> {
        Ok(self.graph.read().await.permissions_of(user, resource)?)
    }
}
