// src/participant/mod.rs

//! Downstream consumers of the deltas of a pass.
//!
//! Participants are injected into the coordinator as an ordered list and
//! invoked sequentially, in that order, after the index committed a pass.
//! A participant failing does not affect the others.

pub mod command;

pub use command::CommandParticipant;

use crate::context::ExecutionContext;
use crate::index::Delta;
use crate::types::{BoxFuture, BuildKind};

/// A registered consumer of build deltas.
///
/// `build` receives the full, ordered delta list of the pass. It must accept
/// an empty list (e.g. a clean pass with nothing to delete).
pub trait Participant: Send {
    fn name(&self) -> &str;

    fn build<'a>(
        &'a mut self,
        ctx: &'a mut ExecutionContext,
        deltas: &'a [Delta],
        kind: BuildKind,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}
