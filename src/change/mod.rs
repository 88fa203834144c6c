// src/change/mod.rs

//! Change bookkeeping shared by discovery, the ledger and build runs.
//!
//! - [`change_set`] holds the to-process / to-delete sets of one pass.
//! - [`delta`] describes structural workspace changes (the input of an
//!   incremental pass).

pub mod change_set;
pub mod delta;

pub use change_set::ChangeSet;
pub use delta::{ChangeKind, DeltaFlags, DeltaNode, Resource};
