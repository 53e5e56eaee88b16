//! SQLite storage implementation.
//!
//! Persists the access graph in the schema of [`crate::access_sql`] and
//! answers reachability and access checks from its closure views, so the
//! database agrees with the in-memory engine on every query.

use std::str::FromStr;

use async_trait::async_trait;
use rsaccess_domain::model::{validate_name, validate_username};
use rsaccess_domain::{
    Domain, DomainError, Grant, Member, MemberRef, NewNode, Node, NodeId, NodeKind, NodeRef,
    ResourceRef, User, UserId, UserRef, DEFAULT_UNIVERSAL_GROUP,
};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions,
};
use sqlx::Transaction;
use tracing::{debug, instrument, warn};

use crate::access_sql::{self, node_tables, ResourceJoin};
use crate::error::{StorageError, StorageResult};
use crate::traits::AccessStore;

/// Default connection timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// SQLite configuration options.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database URL, e.g. `sqlite://access.db` or `sqlite::memory:`.
    pub database_url: String,
    /// Maximum number of connections in the pool.
    ///
    /// Ignored for in-memory databases, which always use a single connection
    /// so that every query sees the same database.
    pub max_connections: u32,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Name given to the universal group when the schema is first created.
    pub universal_group: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 5,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            universal_group: DEFAULT_UNIVERSAL_GROUP.to_string(),
        }
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// SQLite implementation of AccessStore.
pub struct SqliteAccessStore {
    pool: SqlitePool,
    universal_group: String,
}

#[derive(Debug, sqlx::FromRow)]
struct NodeRow {
    id: i64,
    name: Option<String>,
    title: String,
    description: Option<String>,
    domain: String,
}

impl NodeRow {
    fn into_node(self, kind: NodeKind) -> StorageResult<Node> {
        let domain = Domain::from_str(&self.domain).map_err(|e| StorageError::QueryError {
            message: format!("Failed to decode {kind} {}: {e}", self.id),
        })?;
        Ok(Node {
            id: NodeId(self.id),
            kind,
            name: self.name,
            title: self.title,
            description: self.description,
            domain,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId(row.id),
            username: row.username,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GrantRow {
    permission_id: i64,
    group_id: i64,
    target_id: Option<i64>,
}

impl From<GrantRow> for Grant {
    fn from(row: GrantRow) -> Self {
        Grant::new(
            NodeId(row.permission_id),
            NodeId(row.group_id),
            row.target_id.map(NodeId),
        )
    }
}

fn query_error(step: &'static str) -> impl Fn(sqlx::Error) -> StorageError {
    move |e| StorageError::QueryError {
        message: format!("Failed to {step}: {e}"),
    }
}

// -------------------------------------------------------------------------
// Connection-level helpers shared by transactions and plain queries
// -------------------------------------------------------------------------

async fn fetch_node(
    conn: &mut SqliteConnection,
    kind: NodeKind,
    node: &NodeRef,
) -> StorageResult<Option<Node>> {
    let tables = node_tables(kind);
    let row = match node {
        NodeRef::Id(id) => {
            let sql = format!(
                "SELECT id, name, title, description, domain FROM {} WHERE id = ?",
                tables.nodes
            );
            sqlx::query_as::<_, NodeRow>(&sql)
                .bind(id.0)
                .fetch_optional(&mut *conn)
                .await
        }
        NodeRef::Name(name) => {
            let sql = format!(
                "SELECT id, name, title, description, domain FROM {} WHERE name = ?",
                tables.nodes
            );
            sqlx::query_as::<_, NodeRow>(&sql)
                .bind(name)
                .fetch_optional(&mut *conn)
                .await
        }
    }
    .map_err(query_error("load node"))?;
    row.map(|row| row.into_node(kind)).transpose()
}

/// Loads an existing node or fails with `ObjectDoesNotExist`.
async fn load_node(
    conn: &mut SqliteConnection,
    kind: NodeKind,
    node: &NodeRef,
) -> StorageResult<Node> {
    fetch_node(conn, kind, node)
        .await?
        .ok_or_else(|| DomainError::not_found(kind.as_str(), node).into())
}

/// Resolves a reference for a query: ids pass through unchecked.
async fn lookup_node(
    conn: &mut SqliteConnection,
    kind: NodeKind,
    node: &NodeRef,
) -> StorageResult<NodeId> {
    match node {
        NodeRef::Id(id) => Ok(*id),
        NodeRef::Name(_) => Ok(load_node(conn, kind, node).await?.id),
    }
}

async fn universal_id(conn: &mut SqliteConnection) -> StorageResult<Option<NodeId>> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM groups WHERE is_universal = 1")
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_error("find universal node"))?;
    Ok(id.map(NodeId))
}

async fn is_parent(
    conn: &mut SqliteConnection,
    kind: NodeKind,
    parent: NodeId,
    child: NodeId,
) -> StorageResult<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE parent_id = ? AND child_id = ?)",
        node_tables(kind).edges
    );
    sqlx::query_scalar(&sql)
        .bind(parent.0)
        .bind(child.0)
        .fetch_one(&mut *conn)
        .await
        .map_err(query_error("check edge"))
}

async fn is_ancestor(
    conn: &mut SqliteConnection,
    kind: NodeKind,
    ancestor: NodeId,
    descendant: NodeId,
) -> StorageResult<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE ancestor_id = ? AND descendant_id = ?)",
        node_tables(kind).closure
    );
    sqlx::query_scalar(&sql)
        .bind(ancestor.0)
        .bind(descendant.0)
        .fetch_one(&mut *conn)
        .await
        .map_err(query_error("check ancestry"))
}

async fn fetch_user(conn: &mut SqliteConnection, user: &UserRef) -> StorageResult<Option<User>> {
    let row = match user {
        UserRef::Id(id) => {
            sqlx::query_as::<_, UserRow>("SELECT id, username FROM users WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&mut *conn)
                .await
        }
        UserRef::Name(name) => {
            sqlx::query_as::<_, UserRow>("SELECT id, username FROM users WHERE username = ?")
                .bind(name)
                .fetch_optional(&mut *conn)
                .await
        }
    }
    .map_err(query_error("load user"))?;
    Ok(row.map(User::from))
}

async fn load_user(conn: &mut SqliteConnection, user: &UserRef) -> StorageResult<User> {
    fetch_user(conn, user)
        .await?
        .ok_or_else(|| DomainError::not_found("user", user).into())
}

async fn lookup_user(conn: &mut SqliteConnection, user: &UserRef) -> StorageResult<UserId> {
    match user {
        UserRef::Id(id) => Ok(*id),
        UserRef::Name(_) => Ok(load_user(conn, user).await?.id),
    }
}

/// Resolves a member for a mutation: users must exist, resources must be
/// well formed.
async fn resolve_member(conn: &mut SqliteConnection, member: &MemberRef) -> StorageResult<Member> {
    match member {
        MemberRef::User(user) => Ok(Member::User(load_user(conn, user).await?.id)),
        MemberRef::Resource(resource) => {
            resource.validate()?;
            Ok(Member::Resource(resource.clone()))
        }
    }
}

async fn lookup_member(conn: &mut SqliteConnection, member: &MemberRef) -> StorageResult<Member> {
    match member {
        MemberRef::User(user) => Ok(Member::User(lookup_user(conn, user).await?)),
        MemberRef::Resource(resource) => Ok(Member::Resource(resource.clone())),
    }
}

async fn grant_exists(conn: &mut SqliteConnection, grant: &Grant) -> StorageResult<bool> {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM grants
            WHERE permission_id = ? AND group_id = ? AND target_id IS ?
        )
        "#,
    )
    .bind(grant.permission.0)
    .bind(grant.grantee.0)
    .bind(grant.target.map(|t| t.0))
    .fetch_one(&mut *conn)
    .await
    .map_err(query_error("check grant"))
}

impl SqliteAccessStore {
    /// Creates a new SQLite store with the given configuration.
    #[instrument(skip(config))]
    pub async fn from_config(config: &SqliteConfig) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| StorageError::ConnectionError {
                message: format!("Invalid database URL: {e}"),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs));
        pool_options = if is_in_memory(&config.database_url) {
            // Each connection to an in-memory database is a separate database.
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(config.max_connections)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionError {
                message: e.to_string(),
            })?;

        Ok(Self {
            pool,
            universal_group: config.universal_group.clone(),
        })
    }

    /// Creates a new SQLite store from a database URL.
    pub async fn from_url(database_url: &str) -> StorageResult<Self> {
        let config = SqliteConfig {
            database_url: database_url.to_string(),
            ..Default::default()
        };
        Self::from_config(&config).await
    }

    /// Creates the schema and the universal group if they do not exist yet.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> StorageResult<()> {
        debug!("Running database migrations");
        validate_name("group", &self.universal_group)?;

        for (step, statement) in access_sql::SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError {
                    message: format!("Failed to create {step}: {e}"),
                })?;
        }

        sqlx::query(
            r#"
            INSERT INTO groups (name, title, is_universal)
            SELECT ?, 'Everyone', 1
            WHERE NOT EXISTS (SELECT 1 FROM groups WHERE is_universal = 1)
            "#,
        )
        .bind(&self.universal_group)
        .execute(&self.pool)
        .await
        .map_err(query_error("create universal group"))?;

        debug!("Database migrations completed");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Builds a SQL predicate that holds exactly for the rows where
    /// `test(permission, user_column, resource)` would hold.
    ///
    /// The predicate refers to the `access_check` view and can be attached
    /// to any query against this database, e.g.
    /// `SELECT d.* FROM documents AS d JOIN sessions AS s WHERE <predicate>`
    /// with `user_column = "s.user_id"`. An unknown permission id yields a
    /// predicate that matches nothing.
    pub async fn join(
        &self,
        permission: &NodeRef,
        user_column: &str,
        resource: Option<&ResourceJoin<'_>>,
    ) -> StorageResult<String> {
        let mut conn = self.acquire().await?;
        let permission = lookup_node(&mut conn, NodeKind::Permission, permission).await?;
        access_sql::access_join(permission, user_column, resource)
    }

    async fn acquire(&self) -> StorageResult<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| StorageError::ConnectionError {
                message: format!("Failed to acquire connection: {e}"),
            })
    }

    async fn begin(&self) -> StorageResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError {
                message: format!("Failed to begin transaction: {e}"),
            })
    }
}

async fn commit(tx: Transaction<'static, Sqlite>) -> StorageResult<()> {
    tx.commit()
        .await
        .map_err(|e| StorageError::TransactionError {
            message: format!("Failed to commit transaction: {e}"),
        })
}

#[async_trait]
impl AccessStore for SqliteAccessStore {
    #[instrument(skip(self, node), fields(name = ?node.name))]
    async fn create_node(&self, kind: NodeKind, node: NewNode) -> StorageResult<Node> {
        let tables = node_tables(kind);
        let mut tx = self.begin().await?;

        if let Some(name) = &node.name {
            validate_name(kind.as_str(), name)?;
            if fetch_node(&mut tx, kind, &NodeRef::Name(name.clone()))
                .await?
                .is_some()
            {
                return Err(DomainError::ObjectExists {
                    kind: kind.as_str(),
                    name: name.clone(),
                }
                .into());
            }
        }

        let sql = format!(
            "INSERT INTO {} (name, title, description, domain) VALUES (?, ?, ?, ?)",
            tables.nodes
        );
        let id = sqlx::query(&sql)
            .bind(&node.name)
            .bind(&node.title)
            .bind(&node.description)
            .bind(node.domain.as_str())
            .execute(&mut *tx)
            .await
            .map_err(query_error("insert node"))?
            .last_insert_rowid();

        commit(tx).await?;
        Ok(Node {
            id: NodeId(id),
            kind,
            name: node.name,
            title: node.title,
            description: node.description,
            domain: node.domain,
        })
    }

    async fn load_node(&self, kind: NodeKind, node: &NodeRef) -> StorageResult<Node> {
        let mut conn = self.acquire().await?;
        load_node(&mut conn, kind, node).await
    }

    #[instrument(skip(self))]
    async fn delete_node(&self, kind: NodeKind, node: &NodeRef) -> StorageResult<Node> {
        let mut tx = self.begin().await?;
        let deleted = load_node(&mut tx, kind, node).await?;
        if kind == NodeKind::Group && universal_id(&mut tx).await? == Some(deleted.id) {
            return Err(
                DomainError::invalid(format!("the universal {kind} cannot be deleted")).into(),
            );
        }

        // Edges and memberships cascade; grants are left in place.
        let sql = format!("DELETE FROM {} WHERE id = ?", node_tables(kind).nodes);
        sqlx::query(&sql)
            .bind(deleted.id.0)
            .execute(&mut *tx)
            .await
            .map_err(query_error("delete node"))?;

        commit(tx).await?;
        Ok(deleted)
    }

    async fn list_nodes(&self, kind: NodeKind) -> StorageResult<Vec<Node>> {
        let sql = format!(
            "SELECT id, name, title, description, domain FROM {} ORDER BY id",
            node_tables(kind).nodes
        );
        let rows = sqlx::query_as::<_, NodeRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("list nodes"))?;
        rows.into_iter().map(|row| row.into_node(kind)).collect()
    }

    async fn universal_group(&self) -> StorageResult<Node> {
        let mut conn = self.acquire().await?;
        let id = universal_id(&mut conn)
            .await?
            .ok_or_else(|| DomainError::InternalError {
                message: "universal group is missing; run migrations first".to_string(),
            })?;
        load_node(&mut conn, NodeKind::Group, &NodeRef::Id(id)).await
    }

    #[instrument(skip(self))]
    async fn add_child(
        &self,
        kind: NodeKind,
        parent: &NodeRef,
        child: &NodeRef,
    ) -> StorageResult<bool> {
        let mut tx = self.begin().await?;
        let parent = load_node(&mut tx, kind, parent).await?.id;
        let child = load_node(&mut tx, kind, child).await?.id;

        if parent == child {
            return Err(
                DomainError::invalid(format!("{kind} {parent} cannot be its own child")).into(),
            );
        }
        if is_parent(&mut tx, kind, parent, child).await? {
            return Ok(false);
        }
        if is_ancestor(&mut tx, kind, child, parent).await? {
            warn!(
                kind = %kind,
                parent = %parent,
                child = %child,
                "rejected edge that would create a cycle"
            );
            return Err(DomainError::invalid(format!(
                "{kind} {child} is an ancestor of {parent}; edge would create a cycle"
            ))
            .into());
        }

        let sql = format!(
            "INSERT INTO {} (parent_id, child_id) VALUES (?, ?)",
            node_tables(kind).edges
        );
        sqlx::query(&sql)
            .bind(parent.0)
            .bind(child.0)
            .execute(&mut *tx)
            .await
            .map_err(query_error("insert edge"))?;

        commit(tx).await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn remove_child(
        &self,
        kind: NodeKind,
        parent: &NodeRef,
        child: &NodeRef,
    ) -> StorageResult<bool> {
        let mut tx = self.begin().await?;
        let parent = load_node(&mut tx, kind, parent).await?.id;
        let child = load_node(&mut tx, kind, child).await?.id;

        let sql = format!(
            "DELETE FROM {} WHERE parent_id = ? AND child_id = ?",
            node_tables(kind).edges
        );
        let removed = sqlx::query(&sql)
            .bind(parent.0)
            .bind(child.0)
            .execute(&mut *tx)
            .await
            .map_err(query_error("delete edge"))?
            .rows_affected();

        commit(tx).await?;
        Ok(removed > 0)
    }

    async fn parent_of(&self, kind: NodeKind, a: &NodeRef, b: &NodeRef) -> StorageResult<bool> {
        let mut conn = self.acquire().await?;
        let a = lookup_node(&mut conn, kind, a).await?;
        let b = lookup_node(&mut conn, kind, b).await?;
        is_parent(&mut conn, kind, a, b).await
    }

    async fn ancestor_of(
        &self,
        kind: NodeKind,
        a: &NodeRef,
        b: &NodeRef,
    ) -> StorageResult<bool> {
        let mut conn = self.acquire().await?;
        let a = lookup_node(&mut conn, kind, a).await?;
        let b = lookup_node(&mut conn, kind, b).await?;
        is_ancestor(&mut conn, kind, a, b).await
    }

    #[instrument(skip(self))]
    async fn create_user(&self, username: &str) -> StorageResult<User> {
        validate_username(username)?;
        let mut tx = self.begin().await?;
        if fetch_user(&mut tx, &UserRef::Name(username.to_string()))
            .await?
            .is_some()
        {
            return Err(DomainError::ObjectExists {
                kind: "user",
                name: username.to_string(),
            }
            .into());
        }

        let id = sqlx::query("INSERT INTO users (username) VALUES (?)")
            .bind(username)
            .execute(&mut *tx)
            .await
            .map_err(query_error("insert user"))?
            .last_insert_rowid();

        commit(tx).await?;
        Ok(User {
            id: UserId(id),
            username: username.to_string(),
        })
    }

    async fn load_user(&self, user: &UserRef) -> StorageResult<User> {
        let mut conn = self.acquire().await?;
        load_user(&mut conn, user).await
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, user: &UserRef) -> StorageResult<User> {
        let mut tx = self.begin().await?;
        let deleted = load_user(&mut tx, user).await?;
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(deleted.id.0)
            .execute(&mut *tx)
            .await
            .map_err(query_error("delete user"))?;
        commit(tx).await?;
        Ok(deleted)
    }

    async fn list_users(&self) -> StorageResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT id, username FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("list users"))?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    #[instrument(skip(self))]
    async fn add_member(&self, group: &NodeRef, member: &MemberRef) -> StorageResult<bool> {
        let mut tx = self.begin().await?;
        let group = load_node(&mut tx, NodeKind::Group, group).await?.id;
        let member = resolve_member(&mut tx, member).await?;

        let inserted = match &member {
            Member::User(user) => {
                sqlx::query("INSERT OR IGNORE INTO user_groups (group_id, user_id) VALUES (?, ?)")
                    .bind(group.0)
                    .bind(user.0)
                    .execute(&mut *tx)
                    .await
            }
            Member::Resource(resource) => {
                sqlx::query(
                    "INSERT OR IGNORE INTO resource_groups (group_id, resource_type, resource_id) \
                     VALUES (?, ?, ?)",
                )
                .bind(group.0)
                .bind(&resource.resource_type)
                .bind(resource.id)
                .execute(&mut *tx)
                .await
            }
        }
        .map_err(query_error("insert membership"))?
        .rows_affected();

        commit(tx).await?;
        Ok(inserted > 0)
    }

    #[instrument(skip(self))]
    async fn remove_member(&self, group: &NodeRef, member: &MemberRef) -> StorageResult<bool> {
        let mut tx = self.begin().await?;
        let group = load_node(&mut tx, NodeKind::Group, group).await?.id;
        let member = resolve_member(&mut tx, member).await?;

        let removed = match &member {
            Member::User(user) => {
                sqlx::query("DELETE FROM user_groups WHERE group_id = ? AND user_id = ?")
                    .bind(group.0)
                    .bind(user.0)
                    .execute(&mut *tx)
                    .await
            }
            Member::Resource(resource) => {
                sqlx::query(
                    "DELETE FROM resource_groups \
                     WHERE group_id = ? AND resource_type = ? AND resource_id = ?",
                )
                .bind(group.0)
                .bind(&resource.resource_type)
                .bind(resource.id)
                .execute(&mut *tx)
                .await
            }
        }
        .map_err(query_error("delete membership"))?
        .rows_affected();

        commit(tx).await?;
        Ok(removed > 0)
    }

    async fn contains(&self, group: &NodeRef, member: &MemberRef) -> StorageResult<bool> {
        let mut conn = self.acquire().await?;
        let group = lookup_node(&mut conn, NodeKind::Group, group).await?;
        match lookup_member(&mut conn, member).await? {
            Member::User(user) => sqlx::query_scalar(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM group_closure AS gc
                    JOIN user_groups AS m ON m.group_id = gc.descendant_id
                    WHERE gc.ancestor_id = ? AND m.user_id = ?
                )
                "#,
            )
            .bind(group.0)
            .bind(user.0)
            .fetch_one(&mut *conn)
            .await,
            Member::Resource(resource) => sqlx::query_scalar(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM group_closure AS gc
                    JOIN resource_groups AS m ON m.group_id = gc.descendant_id
                    WHERE gc.ancestor_id = ? AND m.resource_type = ? AND m.resource_id = ?
                )
                "#,
            )
            .bind(group.0)
            .bind(&resource.resource_type)
            .bind(resource.id)
            .fetch_one(&mut *conn)
            .await,
        }
        .map_err(query_error("check containment"))
    }

    async fn members(&self, group: &NodeRef) -> StorageResult<Vec<Member>> {
        let mut conn = self.acquire().await?;
        let group = load_node(&mut conn, NodeKind::Group, group).await?.id;

        let users: Vec<i64> =
            sqlx::query_scalar("SELECT user_id FROM user_groups WHERE group_id = ? ORDER BY user_id")
                .bind(group.0)
                .fetch_all(&mut *conn)
                .await
                .map_err(query_error("list user members"))?;
        let resources: Vec<(String, i64)> = sqlx::query_as(
            "SELECT resource_type, resource_id FROM resource_groups \
             WHERE group_id = ? ORDER BY resource_type, resource_id",
        )
        .bind(group.0)
        .fetch_all(&mut *conn)
        .await
        .map_err(query_error("list resource members"))?;

        Ok(users
            .into_iter()
            .map(|id| Member::User(UserId(id)))
            .chain(
                resources
                    .into_iter()
                    .map(|(resource_type, id)| Member::Resource(ResourceRef::new(resource_type, id))),
            )
            .collect())
    }

    #[instrument(skip(self))]
    async fn grant(
        &self,
        permission: &NodeRef,
        grantee: &NodeRef,
        target: Option<&NodeRef>,
    ) -> StorageResult<bool> {
        let mut tx = self.begin().await?;
        let permission = load_node(&mut tx, NodeKind::Permission, permission).await?;
        let grantee = load_node(&mut tx, NodeKind::Group, grantee).await?.id;
        let target = match target {
            Some(target) => Some(load_node(&mut tx, NodeKind::Group, target).await?.id),
            None => None,
        };
        if target.is_some() && !permission.domain.is_resource_scoped() {
            return Err(DomainError::invalid(format!(
                "permission {} is in domain '{}' and cannot be granted on a target group",
                permission.label(),
                permission.domain
            ))
            .into());
        }

        let grant = Grant::new(permission.id, grantee, target);
        if grant_exists(&mut tx, &grant).await? {
            return Ok(false);
        }
        sqlx::query("INSERT INTO grants (permission_id, group_id, target_id) VALUES (?, ?, ?)")
            .bind(grant.permission.0)
            .bind(grant.grantee.0)
            .bind(grant.target.map(|t| t.0))
            .execute(&mut *tx)
            .await
            .map_err(query_error("insert grant"))?;

        commit(tx).await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn revoke(
        &self,
        permission: &NodeRef,
        grantee: &NodeRef,
        target: Option<&NodeRef>,
    ) -> StorageResult<bool> {
        let mut tx = self.begin().await?;
        let permission = load_node(&mut tx, NodeKind::Permission, permission).await?.id;
        let grantee = load_node(&mut tx, NodeKind::Group, grantee).await?.id;
        let target = match target {
            Some(target) => Some(load_node(&mut tx, NodeKind::Group, target).await?.id),
            None => None,
        };

        let removed = sqlx::query(
            "DELETE FROM grants WHERE permission_id = ? AND group_id = ? AND target_id IS ?",
        )
        .bind(permission.0)
        .bind(grantee.0)
        .bind(target.map(|t| t.0))
        .execute(&mut *tx)
        .await
        .map_err(query_error("delete grant"))?
        .rows_affected();

        commit(tx).await?;
        Ok(removed > 0)
    }

    async fn list_grants(&self) -> StorageResult<Vec<Grant>> {
        let rows = sqlx::query_as::<_, GrantRow>(
            "SELECT permission_id, group_id, target_id FROM grants \
             ORDER BY permission_id, group_id, target_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error("list grants"))?;
        Ok(rows.into_iter().map(Grant::from).collect())
    }

    async fn grants_for_permission(&self, permission: &NodeRef) -> StorageResult<Vec<Grant>> {
        let mut conn = self.acquire().await?;
        let permission = lookup_node(&mut conn, NodeKind::Permission, permission).await?;
        let rows = sqlx::query_as::<_, GrantRow>(
            "SELECT permission_id, group_id, target_id FROM grants \
             WHERE permission_id = ? ORDER BY group_id, target_id",
        )
        .bind(permission.0)
        .fetch_all(&mut *conn)
        .await
        .map_err(query_error("list grants for permission"))?;
        Ok(rows.into_iter().map(Grant::from).collect())
    }

    async fn test(
        &self,
        permission: &NodeRef,
        user: &UserRef,
        resource: Option<&ResourceRef>,
    ) -> StorageResult<bool> {
        let mut conn = self.acquire().await?;
        let permission = lookup_node(&mut conn, NodeKind::Permission, permission).await?;
        let user = lookup_user(&mut conn, user).await?;

        // With no resource both binds are NULL, leaving only untargeted rows.
        let allowed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM access_check
                WHERE permission_id = ?1 AND user_id = ?2
                  AND (resource_type IS NULL OR (resource_type = ?3 AND resource_id = ?4))
            )
            "#,
        )
        .bind(permission.0)
        .bind(user.0)
        .bind(resource.map(|r| r.resource_type.as_str()))
        .bind(resource.map(|r| r.id))
        .fetch_one(&mut *conn)
        .await
        .map_err(query_error("check access"))?;

        debug!(
            permission = %permission,
            user = %user,
            resource = ?resource,
            allowed,
            "access check"
        );
        Ok(allowed)
    }

    async fn permissions_of(
        &self,
        user: &UserRef,
        resource: Option<&ResourceRef>,
    ) -> StorageResult<Vec<NodeId>> {
        let mut conn = self.acquire().await?;
        let user = lookup_user(&mut conn, user).await?;
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT permission_id FROM access_check
            WHERE user_id = ?1
              AND (resource_type IS NULL OR (resource_type = ?2 AND resource_id = ?3))
            ORDER BY permission_id
            "#,
        )
        .bind(user.0)
        .bind(resource.map(|r| r.resource_type.as_str()))
        .bind(resource.map(|r| r.id))
        .fetch_all(&mut *conn)
        .await
        .map_err(query_error("list permissions"))?;
        Ok(ids.into_iter().map(NodeId).collect())
    }
}
