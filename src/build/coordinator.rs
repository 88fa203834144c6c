// src/build/coordinator.rs

//! Per-project entry point for build passes.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::cancel::{BuildMonitor, CancelToken};
use crate::context::{ContextProvider, WorkspaceContextProvider};
use crate::discovery::ChangeDiscovery;
use crate::errors::{CoordinatorError, Result};
use crate::index::{FingerprintIndex, Index};
use crate::ledger::PendingChangeLedger;
use crate::participant::Participant;
use crate::state::BuildStateStore;
use crate::types::{ArtifactId, BuildKind, InterruptPolicy, ProjectName};

use super::log::{BuildLogger, TracingBuildLogger};
use super::run::{BuildRun, RunEnd, RunEnv};
use super::{BuildOutcome, BuildRequest};

/// Everything a pass needs exclusive access to. Holding the lock on the
/// slot is what makes a pass the only one running for the project.
struct BuildSlot {
    index: Box<dyn Index>,
    participants: Vec<Box<dyn Participant>>,
    contexts: Arc<dyn ContextProvider>,
    state: Option<Box<dyn BuildStateStore>>,
}

impl BuildSlot {
    fn remember(&mut self, project: &str, kind: BuildKind) {
        if let Some(store) = self.state.as_mut() {
            if let Err(err) = store.remember_last_built(project, kind) {
                warn!(project, error = %err, "failed to remember last built state");
            }
        }
    }

    fn forget(&mut self, project: &str) {
        if let Some(store) = self.state.as_mut() {
            if let Err(err) = store.forget_last_built(project) {
                warn!(project, error = %err, "failed to forget last built state");
            }
        }
    }
}

/// Runs build passes for one project, one at a time.
///
/// Producers feed changes through [`Coordinator::ledger`] at any time; a
/// pass picks them up in MERGE_PENDING.
pub struct Coordinator {
    project: ProjectName,
    ledger: Arc<PendingChangeLedger>,
    discovery: ChangeDiscovery,
    policy: InterruptPolicy,
    logger: Arc<dyn BuildLogger>,
    slot: Mutex<BuildSlot>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("project", &self.project)
            .field("policy", &self.policy)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn builder(discovery: ChangeDiscovery) -> CoordinatorBuilder {
        CoordinatorBuilder::new(discovery)
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn ledger(&self) -> &Arc<PendingChangeLedger> {
        &self.ledger
    }

    pub fn discovery(&self) -> &ChangeDiscovery {
        &self.discovery
    }

    pub fn policy(&self) -> InterruptPolicy {
        self.policy
    }

    /// True while a pass holds the execution slot.
    pub fn is_building(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Whether a last-known-good marker exists. Without a state store the
    /// answer is always `false`, so callers fall back to full passes.
    pub async fn has_build_state(&self) -> Result<bool> {
        let slot = self.slot.lock().await;
        match slot.state.as_ref() {
            Some(store) => Ok(store.has_last_built(&self.project)?),
            None => Ok(false),
        }
    }

    /// Artifacts the index currently knows.
    pub async fn known_artifacts(&self) -> Vec<ArtifactId> {
        let slot = self.slot.lock().await;
        slot.index.known_artifacts().into_iter().collect()
    }

    /// Run one build pass.
    ///
    /// Waits for a running pass of this project to finish first. Returns
    /// `Err(Cancelled)` for a self-detected cancellation and
    /// `Err(ContextUnavailable)` when no execution context could be acquired;
    /// every other ending is a [`BuildOutcome`].
    pub async fn build(&self, request: BuildRequest, cancel: &CancelToken) -> Result<BuildOutcome> {
        let mut slot = self.slot.lock().await;
        let started = Instant::now();

        if request.flags.forget_state_only {
            slot.forget(&self.project);
            info!(project = %self.project, "last built state forgotten");
            return Ok(BuildOutcome::StateForgotten);
        }

        let monitor = BuildMonitor::new(cancel.clone(), request.kind, self.policy);
        let mut run = BuildRun::new(
            self.project.clone(),
            request.kind,
            request.delta.as_ref(),
            request.flags,
        );

        let window = self.ledger.open_window();

        let BuildSlot {
            index,
            participants,
            contexts,
            ..
        } = &mut *slot;
        let env = RunEnv {
            ledger: &self.ledger,
            discovery: &self.discovery,
            index: index.as_mut(),
            participants: participants.as_mut_slice(),
            contexts: contexts.as_ref(),
            logger: self.logger.as_ref(),
            monitor: &monitor,
        };
        let result = run.drive(request.delta.as_ref(), env).await;

        let outcome = match result {
            Ok(RunEnd::Skipped) => {
                window.commit();
                run.mark_finalized();
                slot.remember(&self.project, run.kind());
                Ok(BuildOutcome::Skipped { kind: run.kind() })
            }
            Ok(RunEnd::Completed(report)) => {
                window.commit();
                run.mark_finalized();
                if report.kind == BuildKind::Clean {
                    // A cleaned project has nothing known to be good.
                    slot.forget(&self.project);
                } else {
                    slot.remember(&self.project, report.kind);
                }
                Ok(BuildOutcome::Built(report))
            }
            Err(CoordinatorError::Cancelled) => {
                window.rollback();
                if monitor.is_external_interruption() && slot.state.is_some() {
                    run.mark_interrupted();
                    slot.remember(&self.project, run.kind());
                    info!(project = %self.project, phase = %run.phase(), "build interrupted");
                    self.logger.log("Build interrupted.");
                    Ok(BuildOutcome::Interrupted)
                } else {
                    run.mark_failed();
                    slot.forget(&self.project);
                    info!(project = %self.project, "build cancelled");
                    self.logger.log("Build cancelled.");
                    Err(CoordinatorError::Cancelled)
                }
            }
            Err(err @ CoordinatorError::ContextUnavailable { .. }) => {
                window.rollback();
                run.mark_failed();
                slot.forget(&self.project);
                error!(project = %self.project, error = %err, "cannot build without an execution context");
                Err(err)
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(
                    project = %self.project,
                    kind = %run.kind(),
                    phase = %run.phase(),
                    error = %message,
                    "error during build"
                );
                self.logger
                    .log(&format!("Error during {} build of {}: {}", run.kind(), self.project, message));
                run.mark_failed();
                slot.forget(&self.project);
                window.rollback();
                Ok(BuildOutcome::Failed {
                    kind: run.kind(),
                    message,
                })
            }
        };

        run.release_context();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(project = %self.project, kind = %run.kind(), elapsed_ms, "build pass finished");
        self.logger
            .log(&format!("Build {} in {} ms", self.project, elapsed_ms));
        outcome
    }
}

/// Assembles a [`Coordinator`].
///
/// Defaults: an in-memory [`FingerprintIndex`], no participants, contexts
/// over the discovery root, no state store, [`InterruptPolicy::AutoOnly`]
/// and the tracing build log.
pub struct CoordinatorBuilder {
    discovery: ChangeDiscovery,
    ledger: Option<Arc<PendingChangeLedger>>,
    index: Option<Box<dyn Index>>,
    participants: Vec<Box<dyn Participant>>,
    contexts: Option<Arc<dyn ContextProvider>>,
    state: Option<Box<dyn BuildStateStore>>,
    policy: InterruptPolicy,
    logger: Option<Arc<dyn BuildLogger>>,
}

impl CoordinatorBuilder {
    pub fn new(discovery: ChangeDiscovery) -> Self {
        Self {
            discovery,
            ledger: None,
            index: None,
            participants: Vec::new(),
            contexts: None,
            state: None,
            policy: InterruptPolicy::default(),
            logger: None,
        }
    }

    /// Share a ledger handed out by a [`LedgerRegistry`](crate::ledger::LedgerRegistry).
    pub fn ledger(mut self, ledger: Arc<PendingChangeLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn index(mut self, index: impl Index + 'static) -> Self {
        self.index = Some(Box::new(index));
        self
    }

    pub fn boxed_index(mut self, index: Box<dyn Index>) -> Self {
        self.index = Some(index);
        self
    }

    /// Register a participant; participants are notified in registration order.
    pub fn participant(mut self, participant: impl Participant + 'static) -> Self {
        self.participants.push(Box::new(participant));
        self
    }

    pub fn boxed_participant(mut self, participant: Box<dyn Participant>) -> Self {
        self.participants.push(participant);
        self
    }

    pub fn contexts(mut self, contexts: Arc<dyn ContextProvider>) -> Self {
        self.contexts = Some(contexts);
        self
    }

    pub fn state_store(mut self, store: impl BuildStateStore + 'static) -> Self {
        self.state = Some(Box::new(store));
        self
    }

    pub fn boxed_state_store(mut self, store: Box<dyn BuildStateStore>) -> Self {
        self.state = Some(store);
        self
    }

    pub fn policy(mut self, policy: InterruptPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn BuildLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<Coordinator> {
        let project = self.discovery.project().to_string();

        let ledger = match self.ledger {
            Some(ledger) if ledger.project() != project => {
                return Err(CoordinatorError::ConfigError(format!(
                    "ledger of project '{}' handed to coordinator of project '{}'",
                    ledger.project(),
                    project
                )));
            }
            Some(ledger) => ledger,
            None => Arc::new(PendingChangeLedger::new(project.clone())),
        };

        let contexts = self.contexts.unwrap_or_else(|| {
            Arc::new(WorkspaceContextProvider::new(
                self.discovery.root(),
                Arc::clone(self.discovery.fs()),
            ))
        });

        let index = self
            .index
            .unwrap_or_else(|| Box::new(FingerprintIndex::in_memory()));

        Ok(Coordinator {
            project,
            ledger,
            discovery: self.discovery,
            policy: self.policy,
            logger: self.logger.unwrap_or_else(|| Arc::new(TracingBuildLogger)),
            slot: Mutex::new(BuildSlot {
                index,
                participants: self.participants,
                contexts,
                state: self.state,
            }),
        })
    }
}
