//! Stored access grants.

use std::collections::BTreeSet;

use crate::model::{Grant, NodeId};

/// The set of stored grant triples.
///
/// Grants are kept independent of the hierarchies; ancestry is consulted
/// only when a grant is evaluated, so a grant whose nodes were deleted stays
/// stored but can never match.
#[derive(Debug, Clone, Default)]
pub struct GrantSet {
    grants: BTreeSet<Grant>,
}

impl GrantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a grant. Returns `false` if the exact triple was already stored.
    pub fn insert(&mut self, grant: Grant) -> bool {
        self.grants.insert(grant)
    }

    /// Removes the exact triple. Returns `false` if it was not stored.
    pub fn remove(&mut self, grant: &Grant) -> bool {
        self.grants.remove(grant)
    }

    pub fn contains(&self, grant: &Grant) -> bool {
        self.grants.contains(grant)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Grant> {
        self.grants.iter()
    }

    /// Grants stored directly on `permission`.
    pub fn for_permission(&self, permission: NodeId) -> impl Iterator<Item = &Grant> {
        self.grants
            .iter()
            .filter(move |grant| grant.permission == permission)
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}
