//! Storage Backend Parity Integration Tests
//!
//! These tests verify consistent behavior across all storage backends:
//! - In-Memory (the domain engine behind a lock)
//! - SQLite (closure views over relational tables)
//!
//! Security-Critical: an access check that answers differently in one backend
//! could grant access the other would deny. Every scenario here is built
//! through the `AccessStore` trait on both backends and must produce the
//! same answers, the same listings and the same error kinds.
//!
//! SQLite runs against an in-memory database, so these tests need no
//! external services:
//!   cargo test -p rsaccess-storage --test storage_backend_parity

use rsaccess_domain::{
    Domain, ErrorKind, Member, NewNode, NodeId, NodeKind, NodeRef, ResourceRef, UserRef,
};
use rsaccess_storage::{AccessStore, MemoryAccessStore, SqliteAccessStore};

// ============================================================================
// Test Infrastructure
// ============================================================================

fn create_memory_store() -> MemoryAccessStore {
    MemoryAccessStore::new()
}

async fn create_sqlite_store() -> SqliteAccessStore {
    let store = SqliteAccessStore::from_url("sqlite::memory:")
        .await
        .expect("Failed to create SqliteAccessStore");
    store
        .run_migrations()
        .await
        .expect("Failed to run migrations");
    store
}

fn node(name: &str) -> NodeRef {
    NodeRef::from(name)
}

fn doc(id: i64) -> ResourceRef {
    ResourceRef::new("doc", id)
}

async fn create_named<S: AccessStore>(store: &S, kind: NodeKind, names: &[&str]) {
    for name in names {
        store
            .create_node(kind, NewNode::named(*name))
            .await
            .expect("Failed to create node");
    }
}

async fn link<S: AccessStore>(store: &S, kind: NodeKind, edges: &[(&str, &str)]) {
    for (parent, child) in edges {
        store
            .add_child(kind, &node(parent), &node(child))
            .await
            .expect("Failed to add edge");
    }
}

/// Full `ancestor_of` matrix over the named nodes.
async fn closure<S: AccessStore>(store: &S, kind: NodeKind, names: &[&str]) -> Vec<Vec<bool>> {
    let mut matrix = Vec::new();
    for a in names {
        let mut row = Vec::new();
        for b in names {
            row.push(store.ancestor_of(kind, &node(a), &node(b)).await.unwrap());
        }
        matrix.push(row);
    }
    matrix
}

// ============================================================================
// Section 1: Hierarchy Parity
// ============================================================================

const HIERARCHY_NODES: &[&str] = &["a", "b", "c", "d", "e", "f"];

/// Builds a diamond joined to a chain, removes and re-adds edges, and
/// records the closure after each step.
async fn run_hierarchy_parity_test<S: AccessStore>(store: &S) -> Vec<Vec<Vec<bool>>> {
    let kind = NodeKind::Group;
    create_named(store, kind, HIERARCHY_NODES).await;
    link(
        store,
        kind,
        &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d"), ("d", "e"), ("e", "f")],
    )
    .await;

    let mut snapshots = vec![closure(store, kind, HIERARCHY_NODES).await];

    assert!(store.remove_child(kind, &node("b"), &node("d")).await.unwrap());
    snapshots.push(closure(store, kind, HIERARCHY_NODES).await);

    assert!(store.remove_child(kind, &node("c"), &node("d")).await.unwrap());
    snapshots.push(closure(store, kind, HIERARCHY_NODES).await);

    assert!(!store.remove_child(kind, &node("c"), &node("d")).await.unwrap());
    assert!(store.add_child(kind, &node("b"), &node("d")).await.unwrap());
    assert!(!store.add_child(kind, &node("b"), &node("d")).await.unwrap());
    snapshots.push(closure(store, kind, HIERARCHY_NODES).await);

    snapshots
}

#[tokio::test]
async fn test_hierarchy_closure_matches_across_backends() {
    let memory = run_hierarchy_parity_test(&create_memory_store()).await;
    let sqlite = run_hierarchy_parity_test(&create_sqlite_store().await).await;
    assert_eq!(memory, sqlite);

    // After removing both diamond edges, a no longer reaches d, e or f.
    let cut = &memory[2];
    assert!(cut[0][1] && cut[0][2]);
    assert!(!cut[0][3] && !cut[0][4] && !cut[0][5]);
    assert!(cut[3][5]);
    // Re-adding b -> d restores a -> f.
    assert!(memory[3][0][5]);
}

async fn run_parent_of_parity_test<S: AccessStore>(store: &S) -> Vec<bool> {
    let kind = NodeKind::Permission;
    create_named(store, kind, &["x", "y", "z"]).await;
    link(store, kind, &[("x", "y"), ("y", "z")]).await;
    vec![
        store.parent_of(kind, &node("x"), &node("y")).await.unwrap(),
        store.parent_of(kind, &node("x"), &node("z")).await.unwrap(),
        store.parent_of(kind, &node("x"), &node("x")).await.unwrap(),
        store.ancestor_of(kind, &node("x"), &node("x")).await.unwrap(),
        store.ancestor_of(kind, &node("x"), &node("z")).await.unwrap(),
        store.ancestor_of(kind, &node("z"), &node("x")).await.unwrap(),
        store
            .ancestor_of(kind, &NodeRef::Id(NodeId(999)), &node("x"))
            .await
            .unwrap(),
    ]
}

#[tokio::test]
async fn test_parent_and_ancestor_queries_match() {
    let expected = vec![true, false, false, true, true, false, false];
    assert_eq!(run_parent_of_parity_test(&create_memory_store()).await, expected);
    assert_eq!(
        run_parent_of_parity_test(&create_sqlite_store().await).await,
        expected
    );
}

// ============================================================================
// Section 2: Membership Parity
// ============================================================================

/// X pattern g1, g2 -> g3 -> g4, g5 with doc i a direct member of g{i}.
/// Returns the containment matrix before and after deleting g3.
async fn run_membership_parity_test<S: AccessStore>(store: &S) -> (Vec<Vec<i64>>, Vec<Vec<i64>>) {
    let groups = ["g1", "g2", "g3", "g4", "g5"];
    create_named(store, NodeKind::Group, &groups).await;
    link(
        store,
        NodeKind::Group,
        &[("g1", "g3"), ("g2", "g3"), ("g3", "g4"), ("g3", "g5")],
    )
    .await;
    for (i, group) in groups.iter().enumerate() {
        store
            .add_member(&node(group), &doc(i as i64 + 1).into())
            .await
            .unwrap();
    }

    async fn matrix<S: AccessStore>(store: &S, groups: &[&str]) -> Vec<Vec<i64>> {
        let mut rows = Vec::new();
        for group in groups {
            let mut row = Vec::new();
            for id in 1..=5 {
                if store.contains(&node(group), &doc(id).into()).await.unwrap() {
                    row.push(id);
                }
            }
            rows.push(row);
        }
        rows
    }

    let mut queried = vec!["universal"];
    queried.extend(groups);
    let before = matrix(store, &queried).await;

    store.delete_node(NodeKind::Group, &node("g3")).await.unwrap();
    queried.retain(|g| *g != "g3");
    let after = matrix(store, &queried).await;
    (before, after)
}

#[tokio::test]
async fn test_membership_through_hierarchy_with_deletion() {
    let memory = run_membership_parity_test(&create_memory_store()).await;
    let sqlite = run_membership_parity_test(&create_sqlite_store().await).await;
    assert_eq!(memory, sqlite);

    let (before, after) = memory;
    assert_eq!(before[0], vec![1, 2, 3, 4, 5]);
    assert_eq!(before[1], vec![1, 3, 4, 5]);
    assert_eq!(before[3], vec![3, 4, 5]);
    assert_eq!(after[0], vec![1, 2, 4, 5]);
    assert_eq!(after[1], vec![1]);
    assert_eq!(after[3], vec![4]);
}

async fn run_user_membership_parity_test<S: AccessStore>(store: &S) -> Vec<bool> {
    create_named(store, NodeKind::Group, &["staff", "editors"]).await;
    link(store, NodeKind::Group, &[("staff", "editors")]).await;
    let alice = store.create_user("alice").await.unwrap();
    store.create_user("bob").await.unwrap();
    assert!(store
        .add_member(&node("editors"), &(&alice).into())
        .await
        .unwrap());
    assert!(!store
        .add_member(&node("editors"), &(&alice).into())
        .await
        .unwrap());

    let mut answers = vec![
        store.contains(&node("staff"), &(&alice).into()).await.unwrap(),
        store
            .contains(&node("staff"), &UserRef::from("bob").into())
            .await
            .unwrap(),
    ];
    store.delete_user(&"alice".into()).await.unwrap();
    answers.push(store.contains(&node("staff"), &alice.id.into()).await.unwrap());
    answers.push(store.members(&node("editors")).await.unwrap().is_empty());
    answers
}

#[tokio::test]
async fn test_user_membership_and_deletion_match() {
    let expected = vec![true, false, false, true];
    assert_eq!(
        run_user_membership_parity_test(&create_memory_store()).await,
        expected
    );
    assert_eq!(
        run_user_membership_parity_test(&create_sqlite_store().await).await,
        expected
    );
}

// ============================================================================
// Section 3: Grant Parity
// ============================================================================

/// Chains p1..p5, u1..u5 and r1..r5; user u{i} in group u{i}, doc i in
/// group r{i}; one grant (p3, u3, r3).
async fn build_grant_grid<S: AccessStore>(store: &S) {
    for (kind, prefix) in [
        (NodeKind::Permission, "p"),
        (NodeKind::Group, "u"),
        (NodeKind::Group, "r"),
    ] {
        let names: Vec<String> = (1..=5).map(|i| format!("{prefix}{i}")).collect();
        for name in &names {
            store
                .create_node(kind, NewNode::named(name.as_str()))
                .await
                .unwrap();
        }
        for pair in names.windows(2) {
            store
                .add_child(kind, &node(&pair[0]), &node(&pair[1]))
                .await
                .unwrap();
        }
    }
    for i in 1..=5 {
        let username = format!("u{i}");
        store.create_user(&username).await.unwrap();
        let user = UserRef::from(username.as_str());
        store.add_member(&node(&username), &user.into()).await.unwrap();
        store
            .add_member(&node(&format!("r{i}")), &doc(i).into())
            .await
            .unwrap();
    }
    store
        .grant(&node("p3"), &node("u3"), Some(&node("r3")))
        .await
        .unwrap();
}

async fn grid_answers<S: AccessStore>(store: &S) -> Vec<(usize, usize, i64, bool)> {
    let mut answers = Vec::new();
    for i in 1..=5 {
        let permission = node(&format!("p{i}"));
        for j in 1..=5 {
            let user = UserRef::from(format!("u{j}"));
            for k in 1..=5 {
                let allowed = store.test(&permission, &user, Some(&doc(k))).await.unwrap();
                answers.push((i, j, k, allowed));
            }
        }
    }
    answers
}

#[tokio::test]
async fn test_grant_grid_matches_across_backends() {
    let memory = create_memory_store();
    let sqlite = create_sqlite_store().await;
    build_grant_grid(&memory).await;
    build_grant_grid(&sqlite).await;

    let memory_answers = grid_answers(&memory).await;
    assert_eq!(memory_answers, grid_answers(&sqlite).await);
    for (i, j, k, allowed) in memory_answers {
        assert_eq!(allowed, i >= 3 && j >= 3 && k >= 3, "test(p{i}, u{j}, r{k})");
    }
}

/// Observable state after the grid plus an untargeted grant and a revoke.
#[derive(Debug, PartialEq)]
struct Listings {
    permissions_of: Vec<Vec<NodeId>>,
    grants: Vec<rsaccess_domain::Grant>,
    grants_for_permission: Vec<Vec<rsaccess_domain::Grant>>,
    groups: Vec<rsaccess_domain::Node>,
    permissions: Vec<rsaccess_domain::Node>,
    users: Vec<rsaccess_domain::User>,
    members: Vec<Member>,
}

async fn run_listing_parity_test<S: AccessStore>(store: &S) -> Listings {
    build_grant_grid(store).await;
    store.grant(&node("p5"), &node("u1"), None).await.unwrap();
    store.grant(&node("p1"), &node("u5"), Some(&node("r5"))).await.unwrap();
    assert!(store
        .revoke(&node("p1"), &node("u5"), Some(&node("r5")))
        .await
        .unwrap());
    store
        .add_member(&node("r4"), &ResourceRef::new("avatar", 2).into())
        .await
        .unwrap();
    store
        .add_member(&node("r4"), &UserRef::from("u2").into())
        .await
        .unwrap();

    let mut permissions_of = Vec::new();
    for j in 1..=5 {
        let user = UserRef::from(format!("u{j}"));
        for resource in [None, Some(doc(1)), Some(doc(4))] {
            permissions_of.push(store.permissions_of(&user, resource.as_ref()).await.unwrap());
        }
    }

    let mut grants_for_permission = Vec::new();
    for permission in [node("p1"), node("p3"), node("p5"), NodeRef::Id(NodeId(99))] {
        grants_for_permission.push(store.grants_for_permission(&permission).await.unwrap());
    }

    Listings {
        permissions_of,
        grants: store.list_grants().await.unwrap(),
        grants_for_permission,
        groups: store.list_nodes(NodeKind::Group).await.unwrap(),
        permissions: store.list_nodes(NodeKind::Permission).await.unwrap(),
        users: store.list_users().await.unwrap(),
        members: store.members(&node("r4")).await.unwrap(),
    }
}

#[tokio::test]
async fn test_permissions_of_and_listings_match() {
    let memory = run_listing_parity_test(&create_memory_store()).await;
    let sqlite = run_listing_parity_test(&create_sqlite_store().await).await;
    assert_eq!(memory, sqlite);

    assert_eq!(memory.grants.len(), 2);
    let direct: Vec<usize> = memory.grants_for_permission.iter().map(Vec::len).collect();
    assert_eq!(direct, vec![0, 1, 1, 0]);
    assert_eq!(memory.grants_for_permission[1][0].target, Some(NodeId(9)));
    assert_eq!(memory.groups.len(), 11);
    assert_eq!(
        memory.members,
        vec![
            Member::User(rsaccess_domain::UserId(2)),
            Member::Resource(ResourceRef::new("avatar", 2)),
            Member::Resource(doc(4)),
        ]
    );
    // u4 on doc 4: p3..p5 from the scoped grant.
    assert_eq!(memory.permissions_of[11].len(), 3);
    // u1 without a resource: only the untargeted p5 grant.
    assert_eq!(memory.permissions_of[0].len(), 1);
}

// ============================================================================
// Section 4: Grants Without Resource Scoping
// ============================================================================

async fn run_unscoped_grant_parity_test<S: AccessStore>(store: &S) -> Vec<bool> {
    store
        .create_node(
            NodeKind::Permission,
            NewNode::named("login").with_domain(Domain::None),
        )
        .await
        .unwrap();
    store
        .create_node(
            NodeKind::Permission,
            NewNode::named("login.api").with_domain(Domain::None),
        )
        .await
        .unwrap();
    link(store, NodeKind::Permission, &[("login", "login.api")]).await;
    create_named(store, NodeKind::Group, &["staff"]).await;
    let alice = store.create_user("alice").await.unwrap();
    store.create_user("bob").await.unwrap();
    store.add_member(&node("staff"), &(&alice).into()).await.unwrap();

    store.grant(&node("login"), &node("staff"), None).await.unwrap();
    vec![
        store.test(&node("login.api"), &"alice".into(), None).await.unwrap(),
        store.test(&node("login"), &"alice".into(), Some(&doc(1))).await.unwrap(),
        store.test(&node("login"), &"bob".into(), None).await.unwrap(),
    ]
}

#[tokio::test]
async fn test_unscoped_grants_match() {
    let expected = vec![true, true, false];
    assert_eq!(
        run_unscoped_grant_parity_test(&create_memory_store()).await,
        expected
    );
    assert_eq!(
        run_unscoped_grant_parity_test(&create_sqlite_store().await).await,
        expected
    );
}

async fn run_scoped_grant_without_resource_test<S: AccessStore>(store: &S) -> Vec<bool> {
    build_grant_grid(store).await;
    vec![
        store.test(&node("p3"), &"u3".into(), None).await.unwrap(),
        store.test(&node("p3"), &"u3".into(), Some(&doc(3))).await.unwrap(),
        store
            .test(&node("p3"), &"u3".into(), Some(&ResourceRef::new("avatar", 3)))
            .await
            .unwrap(),
    ]
}

#[tokio::test]
async fn test_targeted_grant_needs_matching_resource() {
    let expected = vec![false, true, false];
    assert_eq!(
        run_scoped_grant_without_resource_test(&create_memory_store()).await,
        expected
    );
    assert_eq!(
        run_scoped_grant_without_resource_test(&create_sqlite_store().await).await,
        expected
    );
}

async fn run_orphaned_grant_parity_test<S: AccessStore>(store: &S) -> (bool, bool, usize) {
    build_grant_grid(store).await;
    let before = store.test(&node("p4"), &"u4".into(), Some(&doc(4))).await.unwrap();
    store.delete_node(NodeKind::Permission, &node("p3")).await.unwrap();
    let after = store.test(&node("p4"), &"u4".into(), Some(&doc(4))).await.unwrap();
    (before, after, store.list_grants().await.unwrap().len())
}

#[tokio::test]
async fn test_orphaned_grants_are_kept_and_never_match() {
    let expected = (true, false, 1);
    assert_eq!(
        run_orphaned_grant_parity_test(&create_memory_store()).await,
        expected
    );
    assert_eq!(
        run_orphaned_grant_parity_test(&create_sqlite_store().await).await,
        expected
    );
}

// ============================================================================
// Section 5: Error Parity
// ============================================================================

async fn run_error_parity_test<S: AccessStore>(store: &S) -> Vec<ErrorKind> {
    create_named(store, NodeKind::Group, &["a", "b", "c"]).await;
    link(store, NodeKind::Group, &[("a", "b"), ("b", "c")]).await;
    store
        .create_node(
            NodeKind::Permission,
            NewNode::named("login").with_domain(Domain::None),
        )
        .await
        .unwrap();

    let mut kinds = Vec::new();
    let mut record = |result: rsaccess_storage::StorageResult<()>| {
        kinds.push(result.expect_err("operation should fail").kind());
    };

    record(
        store
            .create_node(NodeKind::Group, NewNode::named("a"))
            .await
            .map(drop),
    );
    record(store.create_user("").await.map(drop));
    record(
        store
            .create_user(&doc(3).resource_id().unwrap())
            .await
            .map(drop),
    );
    record(store.add_child(NodeKind::Group, &node("c"), &node("a")).await.map(drop));
    record(store.add_child(NodeKind::Group, &node("a"), &node("a")).await.map(drop));
    record(
        store
            .add_child(NodeKind::Group, &node("a"), &node("missing"))
            .await
            .map(drop),
    );
    record(
        store
            .grant(&node("login"), &node("a"), Some(&node("b")))
            .await
            .map(drop),
    );
    record(store.test(&node("nope"), &"nobody".into(), None).await.map(drop));
    record(store.grants_for_permission(&node("nope")).await.map(drop));
    record(
        store
            .add_member(&node("a"), &ResourceRef::new("bad type", 1).into())
            .await
            .map(drop),
    );
    record(
        store
            .delete_node(NodeKind::Group, &node("universal"))
            .await
            .map(drop),
    );
    kinds
}

#[tokio::test]
async fn test_error_kinds_match() {
    let expected = vec![
        ErrorKind::ObjectExists,
        ErrorKind::InvalidParameter,
        ErrorKind::InvalidParameter,
        ErrorKind::InvalidParameter,
        ErrorKind::InvalidParameter,
        ErrorKind::ObjectDoesNotExist,
        ErrorKind::InvalidParameter,
        ErrorKind::ObjectDoesNotExist,
        ErrorKind::ObjectDoesNotExist,
        ErrorKind::InvalidParameter,
        ErrorKind::InvalidParameter,
    ];
    assert_eq!(run_error_parity_test(&create_memory_store()).await, expected);
    assert_eq!(
        run_error_parity_test(&create_sqlite_store().await).await,
        expected
    );
}

async fn run_rejected_edge_leaves_state_test<S: AccessStore>(store: &S) -> Vec<Vec<bool>> {
    create_named(store, NodeKind::Group, &["a", "b", "c"]).await;
    link(store, NodeKind::Group, &[("a", "b"), ("b", "c")]).await;
    let _ = store.add_child(NodeKind::Group, &node("c"), &node("a")).await;
    closure(store, NodeKind::Group, &["a", "b", "c"]).await
}

#[tokio::test]
async fn test_rejected_cycle_leaves_edges_unchanged() {
    let expected = vec![
        vec![true, true, true],
        vec![false, true, true],
        vec![false, false, true],
    ];
    assert_eq!(
        run_rejected_edge_leaves_state_test(&create_memory_store()).await,
        expected
    );
    assert_eq!(
        run_rejected_edge_leaves_state_test(&create_sqlite_store().await).await,
        expected
    );
}
