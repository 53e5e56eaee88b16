//! Access service facade.
//!
//! [`AccessService`] is the entry point applications talk to. It resolves
//! textual references (names, ids and resource-id strings), forwards to an
//! [`AccessStore`] and logs what it did.

use std::sync::Arc;

use rsaccess_domain::{
    Grant, Member, MemberRef, NewNode, Node, NodeId, NodeKind, NodeRef, ResourceRef,
    User, UserRef,
};
use rsaccess_storage::{AccessStore, ResourceJoin, SqliteAccessStore, StorageResult};
use tracing::{debug, info, instrument};

/// Parses a member reference from text.
///
/// A valid prefixed resource id (`doc-2f7ce362`) names a resource; anything
/// else is a user id or username.
pub fn parse_member(value: &str) -> StorageResult<MemberRef> {
    if let Ok(resource) = ResourceRef::from_resource_id(value) {
        return Ok(MemberRef::Resource(resource));
    }
    Ok(MemberRef::User(value.parse::<UserRef>()?))
}

/// Parses an optional resource-id string.
pub fn parse_resource(value: Option<&str>) -> StorageResult<Option<ResourceRef>> {
    Ok(value.map(ResourceRef::from_resource_id).transpose()?)
}

/// Parses an optional node reference (`None` means "no target").
fn parse_node(value: Option<&str>) -> StorageResult<Option<NodeRef>> {
    Ok(value.map(str::parse::<NodeRef>).transpose()?)
}

/// Service facade over an access store.
pub struct AccessService<S: AccessStore> {
    store: Arc<S>,
}

impl<S: AccessStore> Clone for AccessService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AccessStore> AccessService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // Nodes

    #[instrument(skip(self, fields), fields(name = ?fields.name))]
    pub async fn create_node(&self, kind: NodeKind, fields: NewNode) -> StorageResult<Node> {
        let node = self.store.create_node(kind, fields).await?;
        info!(kind = %kind, id = %node.id, label = %node.label(), "created node");
        Ok(node)
    }

    pub async fn create_group(&self, fields: NewNode) -> StorageResult<Node> {
        self.create_node(NodeKind::Group, fields).await
    }

    pub async fn create_permission(&self, fields: NewNode) -> StorageResult<Node> {
        self.create_node(NodeKind::Permission, fields).await
    }

    pub async fn load_node(&self, kind: NodeKind, node: &str) -> StorageResult<Node> {
        self.store.load_node(kind, &node.parse::<NodeRef>()?).await
    }

    #[instrument(skip(self))]
    pub async fn delete_node(&self, kind: NodeKind, node: &str) -> StorageResult<Node> {
        let node = self.store.delete_node(kind, &node.parse::<NodeRef>()?).await?;
        info!(kind = %kind, id = %node.id, "deleted node");
        Ok(node)
    }

    pub async fn list_nodes(&self, kind: NodeKind) -> StorageResult<Vec<Node>> {
        self.store.list_nodes(kind).await
    }

    // Hierarchy

    #[instrument(skip(self))]
    pub async fn add_child(&self, kind: NodeKind, parent: &str, child: &str) -> StorageResult<bool> {
        let added = self
            .store
            .add_child(kind, &parent.parse::<NodeRef>()?, &child.parse::<NodeRef>()?)
            .await?;
        info!(kind = %kind, parent, child, added, "add child");
        Ok(added)
    }

    #[instrument(skip(self))]
    pub async fn remove_child(
        &self,
        kind: NodeKind,
        parent: &str,
        child: &str,
    ) -> StorageResult<bool> {
        let removed = self
            .store
            .remove_child(kind, &parent.parse::<NodeRef>()?, &child.parse::<NodeRef>()?)
            .await?;
        info!(kind = %kind, parent, child, removed, "remove child");
        Ok(removed)
    }

    pub async fn ancestor_of(&self, kind: NodeKind, a: &str, b: &str) -> StorageResult<bool> {
        self.store.ancestor_of(kind, &a.parse::<NodeRef>()?, &b.parse::<NodeRef>()?).await
    }

    // Users and membership

    #[instrument(skip(self))]
    pub async fn create_user(&self, username: &str) -> StorageResult<User> {
        let user = self.store.create_user(username).await?;
        info!(id = %user.id, username, "created user");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, user: &str) -> StorageResult<User> {
        let user = self.store.delete_user(&user.parse::<UserRef>()?).await?;
        info!(id = %user.id, username = %user.username, "deleted user");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn add_member(&self, group: &str, member: &str) -> StorageResult<bool> {
        let added = self
            .store
            .add_member(&group.parse::<NodeRef>()?, &parse_member(member)?)
            .await?;
        info!(group, member, added, "add member");
        Ok(added)
    }

    #[instrument(skip(self))]
    pub async fn remove_member(&self, group: &str, member: &str) -> StorageResult<bool> {
        let removed = self
            .store
            .remove_member(&group.parse::<NodeRef>()?, &parse_member(member)?)
            .await?;
        info!(group, member, removed, "remove member");
        Ok(removed)
    }

    pub async fn contains(&self, group: &str, member: &str) -> StorageResult<bool> {
        self.store
            .contains(&group.parse::<NodeRef>()?, &parse_member(member)?)
            .await
    }

    pub async fn members(&self, group: &str) -> StorageResult<Vec<Member>> {
        self.store.members(&group.parse::<NodeRef>()?).await
    }

    // Grants

    #[instrument(skip(self))]
    pub async fn grant(
        &self,
        permission: &str,
        group: &str,
        target: Option<&str>,
    ) -> StorageResult<bool> {
        let added = self
            .store
            .grant(
                &permission.parse::<NodeRef>()?,
                &group.parse::<NodeRef>()?,
                parse_node(target)?.as_ref(),
            )
            .await?;
        info!(permission, group, target = ?target, added, "grant");
        Ok(added)
    }

    #[instrument(skip(self))]
    pub async fn revoke(
        &self,
        permission: &str,
        group: &str,
        target: Option<&str>,
    ) -> StorageResult<bool> {
        let removed = self
            .store
            .revoke(
                &permission.parse::<NodeRef>()?,
                &group.parse::<NodeRef>()?,
                parse_node(target)?.as_ref(),
            )
            .await?;
        info!(permission, group, target = ?target, removed, "revoke");
        Ok(removed)
    }

    pub async fn list_grants(&self) -> StorageResult<Vec<Grant>> {
        self.store.list_grants().await
    }

    /// Grants made directly on `permission`; grants on its ancestors are not
    /// included.
    pub async fn grants_for_permission(&self, permission: &str) -> StorageResult<Vec<Grant>> {
        self.store
            .grants_for_permission(&permission.parse::<NodeRef>()?)
            .await
    }

    // Checks

    /// Checks whether `user` holds `permission`, optionally on the resource
    /// named by a prefixed resource id.
    pub async fn check(
        &self,
        permission: &str,
        user: &str,
        resource: Option<&str>,
    ) -> StorageResult<bool> {
        let resource = parse_resource(resource)?;
        self.test(&permission.parse::<NodeRef>()?, &user.parse::<UserRef>()?, resource.as_ref())
            .await
    }

    /// Typed variant of [`check`](Self::check).
    pub async fn test(
        &self,
        permission: &NodeRef,
        user: &UserRef,
        resource: Option<&ResourceRef>,
    ) -> StorageResult<bool> {
        let allowed = self.store.test(permission, user, resource).await?;
        debug!(
            permission = %permission,
            user = %user,
            resource = ?resource.map(ToString::to_string),
            allowed,
            "access check"
        );
        Ok(allowed)
    }

    pub async fn permissions_of(
        &self,
        user: &str,
        resource: Option<&str>,
    ) -> StorageResult<Vec<NodeId>> {
        let resource = parse_resource(resource)?;
        self.store
            .permissions_of(&user.parse::<UserRef>()?, resource.as_ref())
            .await
    }
}

impl AccessService<SqliteAccessStore> {
    /// SQL predicate selecting the rows where `user_column` holds
    /// `permission`, optionally on `resource_type` rows keyed by
    /// `id_column`.
    pub async fn join(
        &self,
        permission: &str,
        user_column: &str,
        resource: Option<(&str, &str)>,
    ) -> StorageResult<String> {
        let resource = resource.map(|(resource_type, id_column)| {
            ResourceJoin::new(resource_type, id_column)
        });
        let predicate = self
            .store
            .join(&permission.parse::<NodeRef>()?, user_column, resource.as_ref())
            .await?;
        debug!(permission, user_column, "built access join");
        Ok(predicate)
    }
}
