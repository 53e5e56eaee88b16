//! Benchmark for access checks.
//!
//! Run with: cargo bench -p rsaccess-domain

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rsaccess_domain::{AccessGraph, NewNode, NodeKind, NodeRef, ResourceRef, UserRef};

/// Builds chains of `depth` permissions, user groups and resource groups with
/// a single grant at the top of each chain.
fn chained_graph(depth: usize) -> AccessGraph {
    let mut graph = AccessGraph::new();
    for prefix in ["p", "u", "r"] {
        let kind = if prefix == "p" {
            NodeKind::Permission
        } else {
            NodeKind::Group
        };
        for i in 0..depth {
            graph
                .create_node(kind, NewNode::named(format!("{prefix}{i}")))
                .unwrap();
            if i > 0 {
                graph
                    .add_child(
                        kind,
                        &NodeRef::from(format!("{prefix}{}", i - 1)),
                        &NodeRef::from(format!("{prefix}{i}")),
                    )
                    .unwrap();
            }
        }
    }
    let last = depth - 1;
    graph.create_user("reader").unwrap();
    graph
        .add_member(
            &NodeRef::from(format!("u{last}")),
            &UserRef::from("reader").into(),
        )
        .unwrap();
    graph
        .add_member(
            &NodeRef::from(format!("r{last}")),
            &ResourceRef::new("doc", 1).into(),
        )
        .unwrap();
    graph
        .grant(&"p0".into(), &"u0".into(), Some(&"r0".into()))
        .unwrap();
    graph
}

fn check_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("access_check");
    for depth in [4usize, 16, 64] {
        let graph = chained_graph(depth);
        let permission = NodeRef::from(format!("p{}", depth - 1));
        let user = UserRef::from("reader");
        let resource = ResourceRef::new("doc", 1);
        group.bench_with_input(BenchmarkId::new("deep_chain", depth), &depth, |b, _| {
            b.iter(|| {
                black_box(
                    graph
                        .test(&permission, &user, Some(black_box(&resource)))
                        .unwrap(),
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, check_benchmark);
criterion_main!(benches);
