// src/build/run.rs

//! The state machine of one build pass.
//!
//! ```text
//! SelectKind -> DiscoverChanges -> MergePending -> CheckEmpty
//!     -> Skip
//!     -> Execute -> NotifyParticipants -> Finalize
//! ```
//!
//! `Failed` and `Interrupted` are terminal and may be entered from any phase.
//! A [`BuildRun`] only moves forward through [`BuildRun::drive`]; the
//! ledger window, the last-built marker and timing are handled by the
//! coordinator around it.

use std::fmt;

use tracing::{debug, info, warn};

use crate::cancel::BuildMonitor;
use crate::change::{ChangeSet, DeltaNode};
use crate::context::{ContextProvider, ExecutionContext};
use crate::discovery::ChangeDiscovery;
use crate::errors::{CoordinatorError, Result};
use crate::index::Index;
use crate::ledger::PendingChangeLedger;
use crate::participant::Participant;
use crate::types::{BuildFlags, BuildKind, ProjectName, RequestedKind};

use super::log::BuildLogger;
use super::BuildReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    SelectKind,
    DiscoverChanges,
    MergePending,
    CheckEmpty,
    Execute,
    Skip,
    NotifyParticipants,
    Finalize,
    Failed,
    Interrupted,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildPhase::SelectKind => "SELECT_KIND",
            BuildPhase::DiscoverChanges => "DISCOVER_CHANGES",
            BuildPhase::MergePending => "MERGE_PENDING",
            BuildPhase::CheckEmpty => "CHECK_EMPTY",
            BuildPhase::Execute => "EXECUTE",
            BuildPhase::Skip => "SKIP",
            BuildPhase::NotifyParticipants => "NOTIFY_PARTICIPANTS",
            BuildPhase::Finalize => "FINALIZE",
            BuildPhase::Failed => "FAILED",
            BuildPhase::Interrupted => "INTERRUPTED",
        };
        f.write_str(s)
    }
}

/// Resolve the kind of a pass from the request.
///
/// `Incremental` and `Auto` only stay incremental when a delta is present and
/// does not report the project as just opened.
pub fn select_kind(requested: RequestedKind, delta: Option<&DeltaNode>, flags: BuildFlags) -> BuildKind {
    let full = if flags.recovery {
        BuildKind::Recovery
    } else {
        BuildKind::Full
    };
    match requested {
        RequestedKind::Clean => BuildKind::Clean,
        RequestedKind::Full => full,
        RequestedKind::Incremental | RequestedKind::Auto => match delta {
            Some(delta) if !delta.is_project_opened() => BuildKind::Incremental,
            _ => full,
        },
    }
}

/// How a run ended when it did not fail.
#[derive(Debug)]
pub(crate) enum RunEnd {
    Skipped,
    Completed(BuildReport),
}

/// Collaborators a run borrows for its duration.
pub(crate) struct RunEnv<'a> {
    pub ledger: &'a PendingChangeLedger,
    pub discovery: &'a ChangeDiscovery,
    pub index: &'a mut dyn Index,
    pub participants: &'a mut [Box<dyn Participant>],
    pub contexts: &'a dyn ContextProvider,
    pub logger: &'a dyn BuildLogger,
    pub monitor: &'a BuildMonitor,
}

/// Transient state of one pass.
#[derive(Debug)]
pub struct BuildRun {
    project: ProjectName,
    requested: RequestedKind,
    kind: BuildKind,
    changes: ChangeSet,
    context: Option<ExecutionContext>,
    phase: BuildPhase,
}

impl BuildRun {
    pub fn new(project: impl Into<ProjectName>, requested: RequestedKind, delta: Option<&DeltaNode>, flags: BuildFlags) -> Self {
        Self {
            project: project.into(),
            requested,
            kind: select_kind(requested, delta, flags),
            changes: ChangeSet::new(),
            context: None,
            phase: BuildPhase::SelectKind,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn requested(&self) -> RequestedKind {
        self.requested
    }

    pub fn kind(&self) -> BuildKind {
        self.kind
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    /// The effective change set once MERGE_PENDING ran.
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    fn enter(&mut self, phase: BuildPhase) {
        debug!(project = %self.project, from = %self.phase, to = %phase, "build phase");
        self.phase = phase;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.enter(BuildPhase::Failed);
    }

    pub(crate) fn mark_interrupted(&mut self) {
        self.enter(BuildPhase::Interrupted);
    }

    pub(crate) fn mark_finalized(&mut self) {
        self.enter(BuildPhase::Finalize);
    }

    /// Tear down the execution context, if one was acquired.
    pub(crate) fn release_context(&mut self) {
        if let Some(mut ctx) = self.context.take() {
            ctx.release();
        }
    }

    /// Run the pass up to (not including) FINALIZE.
    pub(crate) async fn drive(&mut self, delta: Option<&DeltaNode>, env: RunEnv<'_>) -> Result<RunEnd> {
        let RunEnv {
            ledger,
            discovery,
            index,
            participants,
            contexts,
            logger,
            monitor,
        } = env;

        // SELECT_KIND
        monitor.check()?;
        info!(project = %self.project, requested = %self.requested, kind = %self.kind, "build pass selected");

        // DISCOVER_CHANGES
        self.enter(BuildPhase::DiscoverChanges);
        if self.kind != BuildKind::Clean && ledger.needs_rebuild() {
            info!(project = %self.project, from = %self.kind, "rebuild required; promoting pass to FULL");
            self.kind = BuildKind::Full;
        }
        let known = index.known_artifacts();
        let discovered = match self.kind {
            BuildKind::Clean => discovery.discover_clean(&known),
            BuildKind::Full => {
                let mut changes = discovery.discover_full(monitor)?;
                discovery.reconcile_removed(&mut changes, &known);
                changes
            }
            BuildKind::Recovery => discovery.discover_new_only(&known, monitor)?,
            BuildKind::Incremental => match delta {
                Some(delta) => discovery.discover_from_delta(delta, monitor)?,
                None => ChangeSet::new(),
            },
        };

        // MERGE_PENDING
        self.enter(BuildPhase::MergePending);
        self.changes = match self.kind {
            BuildKind::Clean => discovered,
            // The index only adds unknown artifacts here; queued changes stay pending.
            BuildKind::Recovery => ledger.stage_discovered(discovered),
            BuildKind::Full | BuildKind::Incremental => ledger.stage(discovered),
        };

        // CHECK_EMPTY
        self.enter(BuildPhase::CheckEmpty);
        if self.changes.is_empty() && self.kind != BuildKind::Clean {
            self.enter(BuildPhase::Skip);
            debug!(project = %self.project, kind = %self.kind, "nothing to build");
            return Ok(RunEnd::Skipped);
        }

        // EXECUTE
        self.enter(BuildPhase::Execute);
        monitor.check()?;
        logger.log(&format!("Building {}", self.project));
        let ctx = contexts.acquire(&self.project).map_err(|err| match err {
            CoordinatorError::ContextUnavailable { .. } => err,
            other => CoordinatorError::ContextUnavailable {
                project: self.project.clone(),
                reason: other.to_string(),
            },
        })?;
        let ctx = self.context.insert(ctx);

        let deltas = if self.kind == BuildKind::Clean {
            index.clean(self.changes.to_delete(), monitor).await?
        } else {
            let recovery_only = self.kind == BuildKind::Recovery;
            index
                .update(&self.project, ctx, &self.changes, recovery_only, monitor)
                .await?
        };
        info!(
            project = %self.project,
            kind = %self.kind,
            to_process = self.changes.to_process().len(),
            to_delete = self.changes.to_delete().len(),
            deltas = deltas.len(),
            "index updated"
        );

        // NOTIFY_PARTICIPANTS
        let mut participant_failures = Vec::new();
        if self.kind == BuildKind::Recovery {
            debug!(project = %self.project, "recovery pass; participants not notified");
        } else {
            // `ctx` borrows the run, so the phase is set in place.
            self.phase = BuildPhase::NotifyParticipants;
            debug!(project = %self.project, to = %self.phase, "build phase");
            for participant in participants.iter_mut() {
                monitor.check()?;
                let name = participant.name().to_string();
                debug!(project = %self.project, participant = %name, deltas = deltas.len(), "notifying participant");
                if let Err(err) = participant.build(ctx, &deltas, self.kind).await {
                    warn!(
                        project = %self.project,
                        participant = %name,
                        error = %err,
                        "participant failed"
                    );
                    logger.log(&format!("Participant {name} failed: {err:#}"));
                    participant_failures.push((name, format!("{err:#}")));
                }
            }
        }

        Ok(RunEnd::Completed(BuildReport {
            kind: self.kind,
            processed: self.changes.to_process().len(),
            deleted: self.changes.to_delete().len(),
            deltas,
            participant_failures,
        }))
    }
}

impl Drop for BuildRun {
    fn drop(&mut self) {
        self.release_context();
    }
}
