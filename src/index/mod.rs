// src/index/mod.rs

//! The index collaborator.
//!
//! The index maintains the persistent description of all known artifacts.
//! Given a change set it updates itself and returns the artifact-level
//! deltas participants have to react to. Its storage format is its own
//! business; the coordinator only relies on the contract of [`Index`].
//!
//! [`fingerprint::FingerprintIndex`] is the implementation the CLI uses.

pub mod fingerprint;

pub use fingerprint::FingerprintIndex;

use std::collections::BTreeSet;
use std::fmt;

use crate::cancel::BuildMonitor;
use crate::change::ChangeSet;
use crate::context::ExecutionContext;
use crate::errors::Result;
use crate::types::{ArtifactId, BoxFuture};

/// What happened to an artifact, as seen by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    Added,
    Changed,
    Removed,
}

impl fmt::Display for DeltaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeltaKind::Added => "ADDED",
            DeltaKind::Changed => "CHANGED",
            DeltaKind::Removed => "REMOVED",
        };
        f.write_str(s)
    }
}

/// One artifact-level change reported by the index.
///
/// The fingerprints let a participant tell what it saw last time from what
/// exists now without asking the index again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub id: ArtifactId,
    pub kind: DeltaKind,
    pub old_fingerprint: Option<String>,
    pub new_fingerprint: Option<String>,
}

impl Delta {
    pub fn added(id: impl Into<ArtifactId>) -> Self {
        Self {
            id: id.into(),
            kind: DeltaKind::Added,
            old_fingerprint: None,
            new_fingerprint: None,
        }
    }

    pub fn changed(id: impl Into<ArtifactId>) -> Self {
        Self {
            id: id.into(),
            kind: DeltaKind::Changed,
            old_fingerprint: None,
            new_fingerprint: None,
        }
    }

    pub fn removed(id: impl Into<ArtifactId>) -> Self {
        Self {
            id: id.into(),
            kind: DeltaKind::Removed,
            old_fingerprint: None,
            new_fingerprint: None,
        }
    }

    pub fn with_fingerprints(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_fingerprint = old;
        self.new_fingerprint = new;
        self
    }
}

/// Persistent artifact index.
///
/// `update` must tolerate being called again with the same change set after
/// a partial failure: the coordinator gives at-least-once delivery.
/// Implementations poll `monitor` per artifact and return
/// [`CoordinatorError::Cancelled`](crate::errors::CoordinatorError::Cancelled)
/// when asked to stop; whatever they committed before that stays committed.
pub trait Index: Send {
    /// Artifacts currently known to the index.
    fn known_artifacts(&self) -> BTreeSet<ArtifactId>;

    /// Apply `changes` and report the resulting deltas in a stable order.
    ///
    /// With `recovery_only` the index only records artifacts it did not know
    /// before.
    fn update<'a>(
        &'a mut self,
        project: &'a str,
        ctx: &'a mut ExecutionContext,
        changes: &'a ChangeSet,
        recovery_only: bool,
        monitor: &'a BuildMonitor,
    ) -> BoxFuture<'a, Result<Vec<Delta>>>;

    /// Drop every entry for `to_delete`.
    fn clean<'a>(
        &'a mut self,
        to_delete: &'a BTreeSet<ArtifactId>,
        monitor: &'a BuildMonitor,
    ) -> BoxFuture<'a, Result<Vec<Delta>>>;
}
