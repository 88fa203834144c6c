// src/build/mod.rs

//! Build passes.
//!
//! A [`Coordinator`] owns everything one project needs to run passes: its
//! ledger, change discovery, the index, the registered participants, the
//! context provider and the last-built marker store. Each call to
//! [`Coordinator::build`] drives one [`BuildRun`] through its phases and
//! reports a [`BuildOutcome`].

pub mod coordinator;
pub mod log;
pub mod run;

pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use log::{BuildLogger, TracingBuildLogger};
pub use run::{BuildPhase, BuildRun, select_kind};

use crate::change::DeltaNode;
use crate::index::Delta;
use crate::types::{BuildFlags, BuildKind, RequestedKind};

/// One invocation of the coordinator.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub kind: RequestedKind,
    pub delta: Option<DeltaNode>,
    pub flags: BuildFlags,
}

impl BuildRequest {
    pub fn new(kind: RequestedKind) -> Self {
        Self {
            kind,
            delta: None,
            flags: BuildFlags::default(),
        }
    }

    pub fn full() -> Self {
        Self::new(RequestedKind::Full)
    }

    pub fn clean() -> Self {
        Self::new(RequestedKind::Clean)
    }

    pub fn incremental(delta: DeltaNode) -> Self {
        Self::new(RequestedKind::Incremental).with_delta(delta)
    }

    /// A host-issued request; may be interrupted by the host.
    pub fn auto(delta: Option<DeltaNode>) -> Self {
        Self {
            kind: RequestedKind::Auto,
            delta,
            flags: BuildFlags::default(),
        }
    }

    /// A full pass that only adds unknown artifacts to the index.
    pub fn recovery() -> Self {
        let mut request = Self::full();
        request.flags.recovery = true;
        request
    }

    /// Only invalidate the persisted last-built marker.
    pub fn forget_state() -> Self {
        let mut request = Self::full();
        request.flags.forget_state_only = true;
        request
    }

    pub fn with_delta(mut self, delta: DeltaNode) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn with_flags(mut self, flags: BuildFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// What a completed pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub kind: BuildKind,
    /// Deltas returned by the index, in the order participants saw them.
    pub deltas: Vec<Delta>,
    pub processed: usize,
    pub deleted: usize,
    /// `(participant, error)` for every participant that failed.
    pub participant_failures: Vec<(String, String)>,
}

/// Result of [`Coordinator::build`] for everything that is not a propagated
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The pass ran to completion and the ledger was committed.
    Built(BuildReport),
    /// The effective change set was empty; nothing was invoked.
    Skipped { kind: BuildKind },
    /// The host interrupted the pass; pending work was re-queued.
    Interrupted,
    /// The pass failed unexpectedly; pending work was re-queued and the
    /// next host pass will be full.
    Failed { kind: BuildKind, message: String },
    /// Only the last-built marker was invalidated.
    StateForgotten,
}

impl BuildOutcome {
    /// True for passes that left the project in a consistent state.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            BuildOutcome::Built(_) | BuildOutcome::Skipped { .. } | BuildOutcome::StateForgotten
        )
    }

    pub fn report(&self) -> Option<&BuildReport> {
        match self {
            BuildOutcome::Built(report) => Some(report),
            _ => None,
        }
    }
}
