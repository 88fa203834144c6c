// src/engine/mod.rs

//! Host runtime driving coordinators from workspace events.
//!
//! The watcher (or a test) sends [`RuntimeEvent`]s; the [`Runtime`] turns
//! them into `Auto` build passes, one project at a time. Deltas that arrive
//! while a pass runs are coalesced in a [`DeltaQueue`], except those for the
//! project being built, which go straight into its ledger.

use crate::change::DeltaNode;
use crate::types::ProjectName;

/// Events flowing into the runtime.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Artifacts of `project` changed.
    WorkspaceChanged { project: ProjectName, delta: DeltaNode },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod queue;
pub mod runtime;

pub use queue::DeltaQueue;
pub use runtime::{PassRecord, Runtime};
