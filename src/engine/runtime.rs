// src/engine/runtime.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::build::{BuildOutcome, BuildRequest, Coordinator};
use crate::cancel::{BuildMonitor, CancelToken};
use crate::change::DeltaNode;
use crate::errors::{CoordinatorError, Result};
use crate::types::{ProjectName, RequestedKind};

use super::{DeltaQueue, RuntimeEvent};

/// One pass the runtime ran, with its outcome or the error it propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRecord {
    pub project: ProjectName,
    pub requested: RequestedKind,
    pub outcome: std::result::Result<BuildOutcome, String>,
}

/// Event loop running build passes for a set of coordinators.
pub struct Runtime {
    coordinators: BTreeMap<ProjectName, Arc<Coordinator>>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    cancel: CancelToken,
    queue: DeltaQueue,
    shutdown: bool,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("projects", &self.coordinators.keys().collect::<Vec<_>>())
            .field("queue", &self.queue)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        coordinators: BTreeMap<ProjectName, Arc<Coordinator>>,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            coordinators,
            event_rx,
            cancel,
            queue: DeltaQueue::new(),
            shutdown: false,
        }
    }

    /// Main event loop.
    ///
    /// Runs until a shutdown is requested or the event channel closes; in the
    /// latter case queued deltas are still built first. Returns every pass
    /// that ran, in order.
    pub async fn run(mut self) -> Result<Vec<PassRecord>> {
        info!(projects = self.coordinators.len(), "incbuild runtime started");
        let mut passes = Vec::new();

        loop {
            if self.queue.is_empty() {
                match self.event_rx.recv().await {
                    Some(event) => self.accept(event, None),
                    None => {
                        info!("runtime event channel closed; exiting");
                        break;
                    }
                }
            }
            if self.shutdown {
                break;
            }

            let Some((project, delta)) = self.queue.pop() else {
                continue;
            };
            if let Some(record) = self.run_pass(&project, delta).await? {
                passes.push(record);
            }
            if self.shutdown {
                break;
            }
        }

        info!(passes = passes.len(), "runtime exiting");
        Ok(passes)
    }

    /// Queue an event. Deltas for `building` go into its ledger and only
    /// schedule a follow-up pass.
    fn accept(&mut self, event: RuntimeEvent, building: Option<&Coordinator>) {
        match event {
            RuntimeEvent::ShutdownRequested => {
                info!("shutdown requested");
                self.shutdown = true;
            }
            RuntimeEvent::WorkspaceChanged { project, delta } => {
                if !self.coordinators.contains_key(&project) {
                    debug!(project = %project, "delta for unknown project ignored");
                    return;
                }
                match building {
                    Some(coordinator) if coordinator.project() == project => {
                        match coordinator
                            .discovery()
                            .discover_from_delta(&delta, &BuildMonitor::never())
                        {
                            Ok(changes) if changes.is_empty() => {}
                            Ok(changes) => {
                                debug!(project = %project, changes = changes.len(), "merging changes into running pass ledger");
                                coordinator.ledger().merge_incoming(changes);
                                self.queue.record(&project, DeltaNode::project(project.clone()));
                            }
                            Err(err) => {
                                warn!(project = %project, error = %err, "could not classify delta; queueing it");
                                self.queue.record(&project, delta);
                            }
                        }
                    }
                    _ => self.queue.record(&project, delta),
                }
            }
        }
    }

    async fn run_pass(&mut self, project: &str, delta: DeltaNode) -> Result<Option<PassRecord>> {
        let Some(coordinator) = self.coordinators.get(project).cloned() else {
            return Ok(None);
        };

        // Without a last known good state the caller asks for a full pass.
        let has_state = match coordinator.has_build_state().await {
            Ok(has_state) => has_state,
            Err(err) => {
                warn!(project, error = %err, "could not read last built state; treating it as absent");
                false
            }
        };
        let request = if has_state {
            BuildRequest::auto(Some(delta))
        } else {
            info!(project, "no last built state; requesting a full pass");
            BuildRequest::full()
        };
        let requested = request.kind;

        let cancel = self.cancel.clone();
        let pass = coordinator.build(request, &cancel);
        tokio::pin!(pass);

        let mut channel_open = true;
        let result = loop {
            tokio::select! {
                result = &mut pass => break result,
                event = self.event_rx.recv(), if channel_open => match event {
                    Some(event) => self.accept(event, Some(&coordinator)),
                    None => channel_open = false,
                },
            }
        };

        let outcome = match result {
            Ok(outcome) => {
                log_outcome(project, &outcome);
                Ok(outcome)
            }
            Err(CoordinatorError::Cancelled) => {
                warn!(project, "build pass cancelled");
                if !self.shutdown {
                    self.cancel.reset();
                }
                Err(CoordinatorError::Cancelled.to_string())
            }
            Err(err) => {
                error!(project, error = %err, "build pass failed");
                Err(err.to_string())
            }
        };

        Ok(Some(PassRecord {
            project: project.to_string(),
            requested,
            outcome,
        }))
    }
}

fn log_outcome(project: &str, outcome: &BuildOutcome) {
    match outcome {
        BuildOutcome::Built(report) => info!(
            project,
            kind = %report.kind,
            deltas = report.deltas.len(),
            participant_failures = report.participant_failures.len(),
            "build pass completed"
        ),
        BuildOutcome::Skipped { kind } => debug!(project, kind = %kind, "build pass skipped"),
        BuildOutcome::Interrupted => info!(project, "build pass interrupted"),
        BuildOutcome::Failed { kind, message } => {
            error!(project, kind = %kind, error = %message, "build pass failed")
        }
        BuildOutcome::StateForgotten => info!(project, "build state forgotten"),
    }
}
