// src/change/change_set.rs

//! The set of artifacts one build pass has to process or delete.

use std::collections::BTreeSet;

use crate::types::ArtifactId;

/// Artifacts to (re)process and artifacts to delete.
///
/// An identifier is never present in both sets:
/// - `update` after `remove` collapses to an update (rename/overwrite),
/// - `remove` after `update` collapses to a delete.
///
/// Both sets are ordered so that every consumer sees artifacts in the same
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    to_process: BTreeSet<ArtifactId>,
    to_delete: BTreeSet<ArtifactId>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` was added or changed.
    pub fn update(&mut self, id: impl Into<ArtifactId>) {
        let id = id.into();
        self.to_delete.remove(&id);
        self.to_process.insert(id);
    }

    /// Record that `id` was removed.
    pub fn remove(&mut self, id: impl Into<ArtifactId>) {
        let id = id.into();
        self.to_process.remove(&id);
        self.to_delete.insert(id);
    }

    /// Apply `later` on top of `self` using the collapse rules.
    ///
    /// `later` is itself a finalized set (disjoint), so the order in which its
    /// deletes and updates are replayed does not matter.
    pub fn merge(&mut self, later: ChangeSet) {
        for id in later.to_delete {
            self.remove(id);
        }
        for id in later.to_process {
            self.update(id);
        }
    }

    /// Like [`merge`](Self::merge) but borrowing `later`.
    pub fn merge_ref(&mut self, later: &ChangeSet) {
        for id in &later.to_delete {
            self.remove(id.clone());
        }
        for id in &later.to_process {
            self.update(id.clone());
        }
    }

    pub fn to_process(&self) -> &BTreeSet<ArtifactId> {
        &self.to_process
    }

    pub fn to_delete(&self) -> &BTreeSet<ArtifactId> {
        &self.to_delete
    }

    pub fn contains_process(&self, id: &str) -> bool {
        self.to_process.contains(&ArtifactId::new(id))
    }

    pub fn contains_delete(&self, id: &str) -> bool {
        self.to_delete.contains(&ArtifactId::new(id))
    }

    pub fn is_empty(&self) -> bool {
        self.to_process.is_empty() && self.to_delete.is_empty()
    }

    /// Total number of affected artifacts.
    pub fn len(&self) -> usize {
        self.to_process.len() + self.to_delete.len()
    }

    pub fn clear(&mut self) {
        self.to_process.clear();
        self.to_delete.clear();
    }
}

impl<I: Into<ArtifactId>> FromIterator<I> for ChangeSet {
    /// Collect artifacts to process.
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        let mut set = ChangeSet::new();
        for id in iter {
            set.update(id);
        }
        set
    }
}
