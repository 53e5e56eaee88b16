//! Direct group memberships of users and resources.
//!
//! Only direct memberships are stored. Containment through the hierarchy is
//! answered by combining them with [`Hierarchy::ancestor_of`].

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use crate::hierarchy::Hierarchy;
use crate::model::{Member, NodeId};

/// Removes `value` from the set under `key` and drops the key once the set
/// is empty.
fn detach<K, V>(map: &mut HashMap<K, BTreeSet<V>>, key: &K, value: &V) -> bool
where
    K: Eq + Hash,
    V: Ord,
{
    let Some(set) = map.get_mut(key) else {
        return false;
    };
    let removed = set.remove(value);
    if set.is_empty() {
        map.remove(key);
    }
    removed
}

/// Bidirectional index of direct memberships.
#[derive(Debug, Clone, Default)]
pub struct Membership {
    members: HashMap<NodeId, BTreeSet<Member>>,
    groups: HashMap<Member, BTreeSet<NodeId>>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `member` as a direct member of `group`. Returns `false` if it
    /// already was.
    pub fn add_member(&mut self, group: NodeId, member: Member) -> bool {
        let added = self.members.entry(group).or_default().insert(member.clone());
        if added {
            self.groups.entry(member).or_default().insert(group);
        }
        added
    }

    /// Drops a direct membership. Returns `false` if there was none.
    pub fn remove_member(&mut self, group: NodeId, member: &Member) -> bool {
        let removed = detach(&mut self.members, &group, member);
        if removed {
            detach(&mut self.groups, member, &group);
        }
        removed
    }

    /// Direct members of `group`.
    pub fn members(&self, group: NodeId) -> Vec<Member> {
        self.members
            .get(&group)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Groups `member` was directly added to.
    pub fn groups_of(&self, member: &Member) -> Vec<NodeId> {
        self.groups
            .get(member)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_direct_member(&self, group: NodeId, member: &Member) -> bool {
        self.members
            .get(&group)
            .is_some_and(|set| set.contains(member))
    }

    /// True iff `member` is a direct member of some group that `group` is an
    /// ancestor of in `hierarchy`.
    pub fn contains(&self, hierarchy: &Hierarchy, group: NodeId, member: &Member) -> bool {
        self.groups
            .get(member)
            .is_some_and(|direct| direct.iter().any(|&g| hierarchy.ancestor_of(group, g)))
    }

    /// Forgets every membership of `group`. Returns how many were dropped.
    pub fn remove_group(&mut self, group: NodeId) -> usize {
        let members = self.members.remove(&group).unwrap_or_default();
        for member in &members {
            detach(&mut self.groups, member, &group);
        }
        members.len()
    }

    /// Forgets every membership of `member`. Returns how many were dropped.
    pub fn remove_member_everywhere(&mut self, member: &Member) -> usize {
        let groups = self.groups.remove(member).unwrap_or_default();
        for group in &groups {
            detach(&mut self.members, group, member);
        }
        groups.len()
    }

    /// Total number of direct memberships.
    pub fn len(&self) -> usize {
        self.members.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
