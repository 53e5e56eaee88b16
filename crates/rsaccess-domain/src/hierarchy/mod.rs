//! Directed acyclic hierarchy of groups or permissions.
//!
//! # Architecture Decisions
//!
//! - **On-demand reachability**: `ancestor_of` runs a breadth-first search
//!   over the current edge set on every call. No closure is cached, so an
//!   edge removal can never leave a stale ancestor behind, including in
//!   diamonds where a second path keeps the descendant reachable.
//!
//! - **Cycle rejection**: `add_child` refuses self-loops and any edge whose
//!   child is already an ancestor of the parent. The edge set is untouched on
//!   rejection.
//!
//! - **Implicit root**: a hierarchy may designate one root node that is an
//!   ancestor of every node without storing edges to them. `parent_of` only
//!   ever reports stored edges.
//!
//! - **Lenient queries**: `parent_of`/`ancestor_of` on unknown ids return
//!   `false`. Only name or id *resolution* fails, with `ObjectDoesNotExist`.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use tracing::warn;

use crate::error::{DomainError, DomainResult};
use crate::model::{validate_name, NewNode, Node, NodeId, NodeKind, NodeRef};

#[cfg(test)]
mod hierarchy_proptest;

/// One hierarchy of nodes of a single kind.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    kind: NodeKind,
    nodes: BTreeMap<NodeId, Node>,
    names: HashMap<String, NodeId>,
    children: HashMap<NodeId, BTreeSet<NodeId>>,
    parents: HashMap<NodeId, BTreeSet<NodeId>>,
    root: Option<NodeId>,
    next_id: i64,
}

/// Removes `value` from the set under `key`, dropping the key once its set
/// is empty. Returns whether `value` was present.
fn detach(map: &mut HashMap<NodeId, BTreeSet<NodeId>>, key: NodeId, value: NodeId) -> bool {
    let Some(set) = map.get_mut(&key) else {
        return false;
    };
    let removed = set.remove(&value);
    if set.is_empty() {
        map.remove(&key);
    }
    removed
}

impl Hierarchy {
    /// Creates an empty hierarchy.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            nodes: BTreeMap::new(),
            names: HashMap::new(),
            children: HashMap::new(),
            parents: HashMap::new(),
            root: None,
            next_id: 1,
        }
    }

    /// Creates a hierarchy whose first node is the universal root.
    pub fn with_root(kind: NodeKind, root: NewNode) -> DomainResult<Self> {
        if let Some(name) = &root.name {
            validate_name(kind.as_str(), name)?;
        }
        Ok(Self::rooted(kind, root).0)
    }

    /// Inserts `root` into a fresh hierarchy. The caller guarantees the name
    /// is valid.
    pub(crate) fn rooted(kind: NodeKind, root: NewNode) -> (Self, NodeId) {
        let mut hierarchy = Self::new(kind);
        let id = hierarchy.insert_node(root);
        hierarchy.root = Some(id);
        (hierarchy, id)
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The universal root, if this hierarchy has one.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates a node and returns its id.
    ///
    /// Fails with `ObjectExists` if the symbolic name is taken.
    pub fn create_node(&mut self, fields: NewNode) -> DomainResult<NodeId> {
        if let Some(name) = &fields.name {
            validate_name(self.kind.as_str(), name)?;
            if self.names.contains_key(name) {
                return Err(DomainError::ObjectExists {
                    kind: self.kind.as_str(),
                    name: name.clone(),
                });
            }
        }
        Ok(self.insert_node(fields))
    }

    fn insert_node(&mut self, fields: NewNode) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        if let Some(name) = &fields.name {
            self.names.insert(name.clone(), id);
        }
        self.nodes.insert(
            id,
            Node {
                id,
                kind: self.kind,
                name: fields.name,
                title: fields.title,
                description: fields.description,
                domain: fields.domain,
            },
        );
        id
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.names.get(name).and_then(|id| self.nodes.get(id))
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Resolves a reference to an existing node.
    pub fn resolve(&self, node: &NodeRef) -> DomainResult<NodeId> {
        self.load(node).map(|n| n.id)
    }

    /// Resolves a reference for a query: names must exist, ids pass through
    /// unchecked so that queries on unknown ids simply answer `false`.
    pub fn lookup(&self, node: &NodeRef) -> DomainResult<NodeId> {
        match node {
            NodeRef::Id(id) => Ok(*id),
            NodeRef::Name(_) => self.resolve(node),
        }
    }

    /// Loads the node a reference points at.
    pub fn load(&self, node: &NodeRef) -> DomainResult<&Node> {
        let found = match node {
            NodeRef::Id(id) => self.nodes.get(id),
            NodeRef::Name(name) => self.node_by_name(name),
        };
        found.ok_or_else(|| DomainError::not_found(self.kind.as_str(), node))
    }

    /// Inserts the edge `parent -> child`.
    ///
    /// Returns `false` if the edge already existed. Fails with
    /// `InvalidParameter` on a self-loop or if the edge would close a cycle.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> DomainResult<bool> {
        self.require(parent)?;
        self.require(child)?;
        if parent == child {
            return Err(DomainError::invalid(format!(
                "{} {parent} cannot be its own child",
                self.kind
            )));
        }
        if self.parent_of(parent, child) {
            return Ok(false);
        }
        if self.ancestor_of(child, parent) {
            warn!(
                kind = %self.kind,
                parent = %parent,
                child = %child,
                "rejected edge that would create a cycle"
            );
            return Err(DomainError::invalid(format!(
                "{} {child} is an ancestor of {parent}; edge would create a cycle",
                self.kind
            )));
        }
        self.children.entry(parent).or_default().insert(child);
        self.parents.entry(child).or_default().insert(parent);
        Ok(true)
    }

    /// Removes the edge `parent -> child`. Returns `false` if it was absent.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let removed = detach(&mut self.children, parent, child);
        if removed {
            detach(&mut self.parents, child, parent);
        }
        removed
    }

    /// True iff the direct edge `a -> b` exists.
    pub fn parent_of(&self, a: NodeId, b: NodeId) -> bool {
        self.children.get(&a).is_some_and(|set| set.contains(&b))
    }

    /// True iff `a == b`, `a` is the root, or a path of edges leads from `a`
    /// to `b`. Both nodes must exist.
    pub fn ancestor_of(&self, a: NodeId, b: NodeId) -> bool {
        if !self.contains_node(a) || !self.contains_node(b) {
            return false;
        }
        if a == b || self.root == Some(a) {
            return true;
        }
        let mut seen = BTreeSet::from([a]);
        let mut queue = VecDeque::from([a]);
        while let Some(current) = queue.pop_front() {
            for &next in self.children.get(&current).into_iter().flatten() {
                if next == b {
                    return true;
                }
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// Direct children of `id`.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.children
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Direct parents of `id`.
    pub fn parents(&self, id: NodeId) -> Vec<NodeId> {
        self.parents
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every node `id` is an ancestor of, including itself.
    pub fn descendants(&self, id: NodeId) -> BTreeSet<NodeId> {
        if !self.contains_node(id) {
            return BTreeSet::new();
        }
        if self.root == Some(id) {
            return self.nodes.keys().copied().collect();
        }
        self.walk(id, &self.children)
    }

    /// Every node that is an ancestor of `id`, including itself and the root.
    pub fn ancestors(&self, id: NodeId) -> BTreeSet<NodeId> {
        if !self.contains_node(id) {
            return BTreeSet::new();
        }
        let mut found = self.walk(id, &self.parents);
        found.extend(self.root);
        found
    }

    /// Deletes a node together with every edge touching it.
    pub fn delete_node(&mut self, id: NodeId) -> DomainResult<Node> {
        if self.root == Some(id) {
            return Err(DomainError::invalid(format!(
                "the universal {} cannot be deleted",
                self.kind
            )));
        }
        let node = self
            .nodes
            .remove(&id)
            .ok_or_else(|| DomainError::not_found(self.kind.as_str(), id))?;
        if let Some(name) = &node.name {
            self.names.remove(name);
        }
        for child in self.children.remove(&id).unwrap_or_default() {
            detach(&mut self.parents, child, id);
        }
        for parent in self.parents.remove(&id).unwrap_or_default() {
            detach(&mut self.children, parent, id);
        }
        Ok(node)
    }

    /// Number of stored edges.
    pub fn edge_count(&self) -> usize {
        self.children.values().map(BTreeSet::len).sum()
    }

    fn require(&self, id: NodeId) -> DomainResult<()> {
        if self.contains_node(id) {
            Ok(())
        } else {
            Err(DomainError::not_found(self.kind.as_str(), id))
        }
    }

    fn walk(
        &self,
        start: NodeId,
        edges: &HashMap<NodeId, BTreeSet<NodeId>>,
    ) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for &next in edges.get(&current).into_iter().flatten() {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }
}
