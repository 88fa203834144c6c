// src/engine/queue.rs

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::change::DeltaNode;
use crate::types::ProjectName;

/// Deltas waiting for a build pass, coalesced per project.
///
/// Semantics:
/// - Projects are served in the order their first pending delta arrived.
/// - A delta recorded for a project that is already queued is absorbed into
///   the queued tree: its children are appended, so a later event for the
///   same artifact wins during discovery.
/// - Popping a project hands out the whole coalesced tree at once; the next
///   delta for it starts a new entry at the back of the queue.
#[derive(Debug, Default)]
pub struct DeltaQueue {
    order: VecDeque<ProjectName>,
    pending: HashMap<ProjectName, DeltaNode>,
}

impl DeltaQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of projects with pending deltas.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn contains(&self, project: &str) -> bool {
        self.pending.contains_key(project)
    }

    pub fn record(&mut self, project: &str, delta: DeltaNode) {
        match self.pending.get_mut(project) {
            Some(queued) => {
                queued.absorb(delta);
                debug!(project, nodes = queued.node_count(), "coalesced delta into queued entry");
            }
            None => {
                debug!(project, "queued delta for new pass");
                self.order.push_back(project.to_string());
                self.pending.insert(project.to_string(), delta);
            }
        }
    }

    /// Take the oldest project and its coalesced delta.
    pub fn pop(&mut self) -> Option<(ProjectName, DeltaNode)> {
        while let Some(project) = self.order.pop_front() {
            if let Some(delta) = self.pending.remove(&project) {
                return Some((project, delta));
            }
        }
        None
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.pending.clear();
    }
}
