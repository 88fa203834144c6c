// src/ledger/mod.rs

//! Per-project queue of pending changes with checkpoint/rollback support.
//!
//! The ledger is the only state that survives across build passes. A pass
//! opens a checkpoint, drains the pending set into its own change set and
//! either commits (pending keeps only what arrived concurrently) or rolls
//! back (everything that was pending, everything the pass discovered and
//! everything that arrived concurrently is queued again).
//!
//! All operations take the internal mutex only for their own duration, so
//! producers may call [`PendingChangeLedger::merge_incoming`] from any thread
//! while a pass is running.

mod registry;

pub use registry::LedgerRegistry;

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::change::ChangeSet;
use crate::types::ProjectName;

#[derive(Debug, Default)]
struct Checkpoint {
    /// Pending set at the time the window opened.
    snapshot: ChangeSet,
    /// Changes discovered by the pass itself (see `stage`).
    staged: ChangeSet,
    /// Changes merged in by producers while the window was open.
    incoming: ChangeSet,
}

#[derive(Debug, Default)]
struct LedgerState {
    pending: ChangeSet,
    rebuild_required: bool,
    checkpoint: Option<Checkpoint>,
}

/// Pending changes of one project.
#[derive(Debug)]
pub struct PendingChangeLedger {
    project: ProjectName,
    state: Mutex<LedgerState>,
}

impl PendingChangeLedger {
    pub fn new(project: impl Into<ProjectName>) -> Self {
        Self {
            project: project.into(),
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(project = %self.project, "ledger mutex poisoned; recovering state");
                poisoned.into_inner()
            }
        }
    }

    /// Open a transactional window.
    ///
    /// Opening a second window before `commit`/`rollback` is a contract
    /// violation: it asserts in debug builds and is otherwise ignored,
    /// returning `false` and keeping the original checkpoint.
    pub fn checkpoint(&self) -> bool {
        let mut state = self.lock();
        if state.checkpoint.is_some() {
            debug_assert!(
                false,
                "checkpoint() called twice without commit/rollback for project '{}'",
                self.project
            );
            warn!(project = %self.project, "checkpoint already open; ignoring");
            return false;
        }
        let snapshot = state.pending.clone();
        debug!(project = %self.project, pending = snapshot.len(), "ledger checkpoint opened");
        state.checkpoint = Some(Checkpoint {
            snapshot,
            ..Checkpoint::default()
        });
        true
    }

    /// Returns and clears the rebuild-required flag.
    ///
    /// The caller that consumes a `true` is responsible for promoting its
    /// pass to a full build.
    pub fn needs_rebuild(&self) -> bool {
        let mut state = self.lock();
        std::mem::take(&mut state.rebuild_required)
    }

    /// Ask for the next pass to be a full build.
    pub fn mark_rebuild_required(&self) {
        let mut state = self.lock();
        state.rebuild_required = true;
        debug!(project = %self.project, "rebuild required");
    }

    /// Merge changes produced outside of a build pass.
    ///
    /// Safe to call at any time from any thread, including while a pass holds
    /// the checkpoint; a later rollback keeps these changes.
    pub fn merge_incoming(&self, changes: ChangeSet) {
        if changes.is_empty() {
            return;
        }
        let mut state = self.lock();
        if let Some(cp) = state.checkpoint.as_mut() {
            cp.incoming.merge_ref(&changes);
        }
        debug!(project = %self.project, merged = changes.len(), "merged incoming changes");
        state.pending.merge(changes);
    }

    /// Drain everything pending and apply `discovered` on top of it.
    ///
    /// Returns the effective change set of the pass. The discovered changes
    /// are remembered by the open window so that a rollback queues them
    /// again.
    pub fn stage(&self, discovered: ChangeSet) -> ChangeSet {
        let mut state = self.lock();
        let mut effective = std::mem::take(&mut state.pending);
        if let Some(cp) = state.checkpoint.as_mut() {
            cp.staged.merge_ref(&discovered);
        }
        effective.merge(discovered);
        debug!(project = %self.project, effective = effective.len(), "staged changes for pass");
        effective
    }

    /// Like [`stage`](Self::stage) but leaves the pending set in place.
    ///
    /// Used by passes that do not apply queued changes (RECOVERY), so those
    /// changes wait for the next pass that does.
    pub fn stage_discovered(&self, discovered: ChangeSet) -> ChangeSet {
        let mut state = self.lock();
        if let Some(cp) = state.checkpoint.as_mut() {
            cp.staged.merge_ref(&discovered);
        }
        debug!(
            project = %self.project,
            effective = discovered.len(),
            pending = state.pending.len(),
            "staged discovered changes only"
        );
        discovered
    }

    /// Close the window, keeping whatever is currently pending.
    pub fn commit(&self) {
        let mut state = self.lock();
        if state.checkpoint.take().is_none() {
            debug!(project = %self.project, "commit without open checkpoint");
        }
        debug!(project = %self.project, pending = state.pending.len(), "ledger committed");
    }

    /// Restore the state of the last checkpoint, then re-apply what the pass
    /// staged and what arrived concurrently. Also requires a rebuild.
    pub fn rollback(&self) {
        let mut state = self.lock();
        if let Some(cp) = state.checkpoint.take() {
            let mut restored = cp.snapshot;
            restored.merge(cp.staged);
            restored.merge(cp.incoming);
            debug!(project = %self.project, restored = restored.len(), "ledger rolled back");
            state.pending = restored;
        } else {
            warn!(project = %self.project, "rollback without open checkpoint");
        }
        state.rebuild_required = true;
    }

    /// Copy of the currently pending changes.
    pub fn pending(&self) -> ChangeSet {
        self.lock().pending.clone()
    }

    pub fn is_checkpointed(&self) -> bool {
        self.lock().checkpoint.is_some()
    }

    /// Peek at the rebuild flag without consuming it.
    pub fn rebuild_required(&self) -> bool {
        self.lock().rebuild_required
    }

    /// Open a checkpoint that is rolled back unless it is explicitly closed.
    pub fn open_window(&self) -> LedgerWindow<'_> {
        self.checkpoint();
        LedgerWindow {
            ledger: self,
            closed: false,
        }
    }
}

/// A checkpoint held by one build pass.
///
/// Dropping the window without [`commit`](LedgerWindow::commit) or
/// [`rollback`](LedgerWindow::rollback) rolls the ledger back, so a pass
/// whose future is dropped halfway requeues what it had staged.
#[derive(Debug)]
#[must_use = "dropping the window rolls the ledger back"]
pub struct LedgerWindow<'a> {
    ledger: &'a PendingChangeLedger,
    closed: bool,
}

impl LedgerWindow<'_> {
    pub fn commit(mut self) {
        self.closed = true;
        self.ledger.commit();
    }

    pub fn rollback(mut self) {
        self.closed = true;
        self.ledger.rollback();
    }
}

impl Drop for LedgerWindow<'_> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(project = %self.ledger.project, "ledger window dropped while open; rolling back");
            self.ledger.rollback();
        }
    }
}
