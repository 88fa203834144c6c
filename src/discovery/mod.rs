// src/discovery/mod.rs

//! Computing the change set of a pass.
//!
//! Two sources feed a pass:
//! - a full scan of the project root (`discover_full`, and the
//!   new-artifacts-only variant used by recovery passes),
//! - a structural delta tree (`discover_from_delta`).
//!
//! Only artifacts accepted by the project's [`ArtifactFilter`] are owned by
//! the coordinator; everything else is skipped silently. Both traversals poll
//! the [`BuildMonitor`] while they run and return
//! [`CoordinatorError::Cancelled`] instead of a partial result.

pub mod filter;

pub use filter::{ArtifactFilter, FilterDefaults, FilterSpec};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::cancel::BuildMonitor;
use crate::change::{ChangeKind, ChangeSet, DeltaNode, Resource};
use crate::errors::{CoordinatorError, Result};
use crate::fs::FileSystem;
use crate::types::{ArtifactId, ProjectName};

/// Change discovery for one project.
#[derive(Debug, Clone)]
pub struct ChangeDiscovery {
    project: ProjectName,
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    filter: ArtifactFilter,
}

impl ChangeDiscovery {
    pub fn new(
        project: impl Into<ProjectName>,
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        filter: ArtifactFilter,
    ) -> Self {
        Self {
            project: project.into(),
            root: root.into(),
            fs,
            filter,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filter(&self) -> &ArtifactFilter {
        &self.filter
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Every owned artifact under the project root, all to be processed.
    pub fn discover_full(&self, monitor: &BuildMonitor) -> Result<ChangeSet> {
        let found = self.scan(monitor)?;
        debug!(project = %self.project, artifacts = found.len(), "full scan complete");
        Ok(found.into_iter().collect())
    }

    /// Like [`discover_full`](Self::discover_full) but leaves out artifacts
    /// the index already knows.
    pub fn discover_new_only(
        &self,
        known: &BTreeSet<ArtifactId>,
        monitor: &BuildMonitor,
    ) -> Result<ChangeSet> {
        let found = self.scan(monitor)?;
        let fresh: ChangeSet = found.into_iter().filter(|id| !known.contains(id)).collect();
        debug!(
            project = %self.project,
            new_artifacts = fresh.to_process().len(),
            "new-artifacts-only scan complete"
        );
        Ok(fresh)
    }

    /// Walk a delta tree and classify every owned artifact it mentions.
    ///
    /// Traversal is pre-order and follows child order, so a removal followed
    /// by an addition of the same artifact ends up as an update.
    pub fn discover_from_delta(&self, delta: &DeltaNode, monitor: &BuildMonitor) -> Result<ChangeSet> {
        let mut changes = ChangeSet::new();
        let mut stack: Vec<&DeltaNode> = vec![delta];

        while let Some(node) = stack.pop() {
            if monitor.is_cancelled() {
                debug!(project = %self.project, "delta traversal cancelled");
                return Err(CoordinatorError::Cancelled);
            }

            let descend = match &node.resource {
                Resource::Project(name) => name == &self.project,
                Resource::Folder(_) => true,
                Resource::Artifact(path) => {
                    self.classify(&mut changes, path, node.kind);
                    true
                }
            };

            if descend {
                stack.extend(node.children.iter().rev());
            }
        }

        debug!(
            project = %self.project,
            to_process = changes.to_process().len(),
            to_delete = changes.to_delete().len(),
            "delta traversal complete"
        );
        Ok(changes)
    }

    /// Everything the index knows, to be deleted.
    pub fn discover_clean(&self, known: &BTreeSet<ArtifactId>) -> ChangeSet {
        let mut changes = ChangeSet::new();
        for id in known {
            changes.remove(id.clone());
        }
        changes
    }

    /// Add to `to_delete` every artifact the index knows that a full scan no
    /// longer found.
    pub fn reconcile_removed(&self, changes: &mut ChangeSet, known: &BTreeSet<ArtifactId>) {
        let stale: Vec<ArtifactId> = known
            .iter()
            .filter(|id| !changes.to_process().contains(*id))
            .cloned()
            .collect();
        if !stale.is_empty() {
            debug!(project = %self.project, stale = stale.len(), "known artifacts missing from scan");
        }
        for id in stale {
            changes.remove(id);
        }
    }

    fn classify(&self, changes: &mut ChangeSet, path: &str, kind: ChangeKind) {
        let id = ArtifactId::new(path);
        if !self.filter.matches(id.as_str()) {
            trace!(project = %self.project, path, "not an owned artifact; skipping");
            return;
        }
        match kind {
            ChangeKind::Removed => changes.remove(id),
            ChangeKind::Added | ChangeKind::Changed => changes.update(id),
        }
    }

    fn scan(&self, monitor: &BuildMonitor) -> Result<BTreeSet<ArtifactId>> {
        let mut found = BTreeSet::new();
        if !self.fs.is_dir(&self.root) {
            warn!(project = %self.project, root = ?self.root, "project root is not a directory");
            return Ok(found);
        }

        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            if monitor.is_cancelled() {
                debug!(project = %self.project, "project scan cancelled");
                return Err(CoordinatorError::Cancelled);
            }
            for path in self.fs.read_dir(&dir)? {
                if self.fs.is_dir(&path) {
                    stack.push(path);
                } else if self.fs.is_file(&path) {
                    if let Some(rel) = relative_id(&self.root, &path) {
                        if self.filter.matches(rel.as_str()) {
                            found.insert(rel);
                        }
                    }
                }
            }
        }
        Ok(found)
    }
}

fn relative_id(root: &Path, path: &Path) -> Option<ArtifactId> {
    let rel = path.strip_prefix(root).ok()?;
    Some(ArtifactId::new(rel.to_string_lossy().into_owned()))
}
