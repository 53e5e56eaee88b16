//! SQL projection of the access graph.
//!
//! The relational schema stores the same facts as the in-memory engine:
//! node tables with their direct edges, direct memberships and grant
//! triples. Three views derive everything else:
//!
//! - `group_closure` / `permission_closure`: reflexive transitive closure of
//!   the edge tables as `(ancestor_id, descendant_id)` pairs, computed with
//!   recursive CTEs. The universal group contributes a pair for every group;
//!   permissions have no universal root.
//! - `access_check`: one row per `(permission, user, resource)` a grant
//!   implies. Grants without a target produce rows with `NULL` resource
//!   columns, matching any resource and the no-resource check.
//!
//! [`access_join`] turns `access_check` into a predicate a caller can attach
//! to its own query, so filtering rows by access runs in the database.

use rsaccess_domain::{resource_id, DomainError, NodeId, NodeKind};

use crate::error::StorageResult;

/// Table names for one node kind.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NodeTables {
    pub nodes: &'static str,
    pub edges: &'static str,
    pub closure: &'static str,
}

pub(crate) fn node_tables(kind: NodeKind) -> NodeTables {
    match kind {
        NodeKind::Group => NodeTables {
            nodes: "groups",
            edges: "group_edges",
            closure: "group_closure",
        },
        NodeKind::Permission => NodeTables {
            nodes: "permissions",
            edges: "permission_edges",
            closure: "permission_closure",
        },
    }
}

/// Schema statements, applied in order. Every statement is idempotent.
pub(crate) const SCHEMA: &[(&str, &str)] = &[
    (
        "groups table",
        r#"
        CREATE TABLE IF NOT EXISTS groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE,
            title TEXT NOT NULL,
            description TEXT,
            domain TEXT NOT NULL DEFAULT 'any' CHECK (domain IN ('any', 'none')),
            is_universal INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "group_edges table",
        r#"
        CREATE TABLE IF NOT EXISTS group_edges (
            parent_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            child_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            PRIMARY KEY (parent_id, child_id)
        )
        "#,
    ),
    (
        "group_edges child index",
        "CREATE INDEX IF NOT EXISTS idx_group_edges_child ON group_edges(child_id)",
    ),
    (
        "permissions table",
        r#"
        CREATE TABLE IF NOT EXISTS permissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE,
            title TEXT NOT NULL,
            description TEXT,
            domain TEXT NOT NULL DEFAULT 'any' CHECK (domain IN ('any', 'none'))
        )
        "#,
    ),
    (
        "permission_edges table",
        r#"
        CREATE TABLE IF NOT EXISTS permission_edges (
            parent_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
            child_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
            PRIMARY KEY (parent_id, child_id)
        )
        "#,
    ),
    (
        "permission_edges child index",
        "CREATE INDEX IF NOT EXISTS idx_permission_edges_child ON permission_edges(child_id)",
    ),
    (
        "users table",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE
        )
        "#,
    ),
    (
        "user_groups table",
        r#"
        CREATE TABLE IF NOT EXISTS user_groups (
            group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            PRIMARY KEY (group_id, user_id)
        )
        "#,
    ),
    (
        "user_groups user index",
        "CREATE INDEX IF NOT EXISTS idx_user_groups_user ON user_groups(user_id)",
    ),
    (
        "resource_groups table",
        r#"
        CREATE TABLE IF NOT EXISTS resource_groups (
            group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            resource_type TEXT NOT NULL,
            resource_id INTEGER NOT NULL,
            PRIMARY KEY (group_id, resource_type, resource_id)
        )
        "#,
    ),
    (
        "resource_groups resource index",
        r#"
        CREATE INDEX IF NOT EXISTS idx_resource_groups_resource
            ON resource_groups(resource_type, resource_id)
        "#,
    ),
    // Grants carry no foreign keys: a grant naming a deleted node stays
    // stored and simply never matches.
    (
        "grants table",
        r#"
        CREATE TABLE IF NOT EXISTS grants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            permission_id INTEGER NOT NULL,
            group_id INTEGER NOT NULL,
            target_id INTEGER
        )
        "#,
    ),
    (
        "grants triple index",
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_grants_triple
            ON grants(permission_id, group_id, IFNULL(target_id, -1))
        "#,
    ),
    (
        "group_closure view",
        r#"
        CREATE VIEW IF NOT EXISTS group_closure (ancestor_id, descendant_id) AS
        WITH RECURSIVE walk(ancestor_id, descendant_id) AS (
            SELECT id, id FROM groups
            UNION
            SELECT walk.ancestor_id, e.child_id
            FROM walk JOIN group_edges AS e ON e.parent_id = walk.descendant_id
        )
        SELECT ancestor_id, descendant_id FROM walk
        UNION
        SELECT u.id, g.id FROM groups AS u CROSS JOIN groups AS g
        WHERE u.is_universal = 1
        "#,
    ),
    (
        "permission_closure view",
        r#"
        CREATE VIEW IF NOT EXISTS permission_closure (ancestor_id, descendant_id) AS
        WITH RECURSIVE walk(ancestor_id, descendant_id) AS (
            SELECT id, id FROM permissions
            UNION
            SELECT walk.ancestor_id, e.child_id
            FROM walk JOIN permission_edges AS e ON e.parent_id = walk.descendant_id
        )
        SELECT ancestor_id, descendant_id FROM walk
        "#,
    ),
    (
        "access_check view",
        r#"
        CREATE VIEW IF NOT EXISTS access_check
            (permission_id, permission, user_id, username, resource_type, resource_id) AS
        SELECT DISTINCT
            pc.descendant_id, p.name, ug.user_id, u.username, rg.resource_type, rg.resource_id
        FROM grants AS gr
        JOIN permission_closure AS pc ON pc.ancestor_id = gr.permission_id
        JOIN permissions AS p ON p.id = pc.descendant_id
        JOIN group_closure AS gc ON gc.ancestor_id = gr.group_id
        JOIN user_groups AS ug ON ug.group_id = gc.descendant_id
        JOIN users AS u ON u.id = ug.user_id
        LEFT JOIN group_closure AS tc ON tc.ancestor_id = gr.target_id
        LEFT JOIN resource_groups AS rg ON rg.group_id = tc.descendant_id
        WHERE gr.target_id IS NULL OR rg.group_id IS NOT NULL
        "#,
    ),
];

/// The resource side of an [`access_join`]: the resource type rows of the
/// caller's table belong to, and the column holding their surrogate id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceJoin<'a> {
    pub resource_type: &'a str,
    pub id_column: &'a str,
}

impl<'a> ResourceJoin<'a> {
    pub fn new(resource_type: &'a str, id_column: &'a str) -> Self {
        Self {
            resource_type,
            id_column,
        }
    }
}

/// Checks a column reference such as `id` or `d.id`: one or more SQL
/// identifiers joined by dots.
pub fn validate_column(column: &str) -> StorageResult<()> {
    let valid = !column.is_empty()
        && column.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(DomainError::invalid(format!("'{column}' is not a valid column reference")).into())
    }
}

/// Builds a boolean SQL predicate that holds exactly for the rows where
/// `test(permission, user_column, resource)` would return `true`.
///
/// `user_column` must hold user ids. With `resource`, `id_column` must hold
/// resource ids of `resource_type`. Without it, only grants that carry no
/// target match, as in a check without a resource.
pub fn access_join(
    permission: NodeId,
    user_column: &str,
    resource: Option<&ResourceJoin<'_>>,
) -> StorageResult<String> {
    validate_column(user_column)?;
    let resource_clause = match resource {
        Some(join) => {
            validate_column(join.id_column)?;
            resource_id::validate_prefix(join.resource_type)?;
            format!(
                "(ac.resource_type IS NULL OR (ac.resource_type = '{}' AND ac.resource_id = {}))",
                join.resource_type, join.id_column
            )
        }
        None => "ac.resource_type IS NULL".to_string(),
    };
    Ok(format!(
        "EXISTS (SELECT 1 FROM access_check AS ac WHERE ac.permission_id = {permission} \
         AND ac.user_id = {user_column} AND {resource_clause})"
    ))
}
