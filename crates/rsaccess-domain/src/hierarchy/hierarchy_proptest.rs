//! Property-based tests for hierarchy reachability.

use proptest::prelude::*;

use super::Hierarchy;
use crate::model::{NewNode, NodeId, NodeKind};

const NODES: usize = 8;

/// Edges `i -> j` with `i < j`, which keeps every generated graph acyclic.
fn dag_edges() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..NODES, 0..NODES), 0..24).prop_map(|pairs| {
        pairs
            .into_iter()
            .filter(|(a, b)| a != b)
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect()
    })
}

/// Reflexive transitive closure by Floyd-Warshall.
fn naive_closure(edges: &[(usize, usize)]) -> [[bool; NODES]; NODES] {
    let mut reach = [[false; NODES]; NODES];
    for (i, row) in reach.iter_mut().enumerate() {
        row[i] = true;
    }
    for &(a, b) in edges {
        reach[a][b] = true;
    }
    for k in 0..NODES {
        for i in 0..NODES {
            for j in 0..NODES {
                if reach[i][k] && reach[k][j] {
                    reach[i][j] = true;
                }
            }
        }
    }
    reach
}

fn build(edges: &[(usize, usize)]) -> (Hierarchy, Vec<NodeId>) {
    let mut hierarchy = Hierarchy::new(NodeKind::Group);
    let ids: Vec<NodeId> = (0..NODES)
        .map(|i| hierarchy.create_node(NewNode::named(format!("n{i}"))).unwrap())
        .collect();
    for &(a, b) in edges {
        hierarchy.add_child(ids[a], ids[b]).unwrap();
    }
    (hierarchy, ids)
}

fn assert_matches(
    hierarchy: &Hierarchy,
    ids: &[NodeId],
    edges: &[(usize, usize)],
) -> Result<(), TestCaseError> {
    let expected = naive_closure(edges);
    for i in 0..NODES {
        for j in 0..NODES {
            prop_assert_eq!(
                hierarchy.ancestor_of(ids[i], ids[j]),
                expected[i][j],
                "ancestor_of(n{}, n{}) with edges {:?}",
                i,
                j,
                edges
            );
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn test_ancestor_of_matches_naive_closure(edges in dag_edges()) {
        let (hierarchy, ids) = build(&edges);
        assert_matches(&hierarchy, &ids, &edges)?;
    }

    #[test]
    fn test_closure_exact_after_remove_and_readd(
        edges in dag_edges(),
        pick in any::<prop::sample::Index>(),
    ) {
        prop_assume!(!edges.is_empty());
        let (mut hierarchy, ids) = build(&edges);
        let removed = edges[pick.index(edges.len())];

        hierarchy.remove_child(ids[removed.0], ids[removed.1]);
        let remaining: Vec<_> = edges.iter().copied().filter(|e| *e != removed).collect();
        assert_matches(&hierarchy, &ids, &remaining)?;

        hierarchy.add_child(ids[removed.0], ids[removed.1]).unwrap();
        assert_matches(&hierarchy, &ids, &edges)?;
    }

    #[test]
    fn test_reverse_edges_are_rejected(edges in dag_edges()) {
        let (mut hierarchy, ids) = build(&edges);
        let closure = naive_closure(&edges);
        for i in 0..NODES {
            for j in 0..NODES {
                if i != j && closure[i][j] {
                    prop_assert!(hierarchy.add_child(ids[j], ids[i]).is_err());
                }
            }
        }
    }
}
