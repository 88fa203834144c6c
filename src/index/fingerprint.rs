// src/index/fingerprint.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::BuildMonitor;
use crate::change::ChangeSet;
use crate::context::ExecutionContext;
use crate::errors::{CoordinatorError, Result};
use crate::fs::FileSystem;
use crate::types::{ArtifactId, BoxFuture, STATE_DIR};

use super::{Delta, Index};

const INDEX_FORMAT_VERSION: u32 = 1;

/// Relative path (from a project root) of the persisted index of `project`.
pub fn index_file_path(root: &Path, project: &str) -> PathBuf {
    root.join(STATE_DIR).join(format!("index-{project}.json"))
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    entries: BTreeMap<ArtifactId, String>,
}

/// Index keeping one blake3 content fingerprint per artifact.
///
/// An artifact is reported as `Changed` only when its content fingerprint
/// differs from the recorded one, so re-processing an unchanged artifact
/// (e.g. after an interrupted pass) produces no delta. Entries are committed
/// one artifact at a time; a cancelled update keeps what it already did.
#[derive(Debug)]
pub struct FingerprintIndex {
    entries: BTreeMap<ArtifactId, String>,
    storage: Option<(Arc<dyn FileSystem>, PathBuf)>,
}

impl FingerprintIndex {
    /// An index that lives in memory only.
    pub fn in_memory() -> Self {
        Self {
            entries: BTreeMap::new(),
            storage: None,
        }
    }

    /// Load the index persisted at `path`, or start empty.
    ///
    /// A missing, unreadable or incompatible file is not an error: the index
    /// starts fresh and the next pass reports everything as added.
    pub fn open(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = if fs.is_file(&path) {
            match load_entries(fs.as_ref(), &path) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = ?path, error = %err, "discarding unreadable index");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = ?path, entries = entries.len(), "opened fingerprint index");
        Self {
            entries,
            storage: Some((fs, path)),
        }
    }

    pub fn fingerprint_of(&self, id: &ArtifactId) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<()> {
        let Some((fs, path)) = &self.storage else {
            return Ok(());
        };
        let doc = PersistedIndex {
            version: INDEX_FORMAT_VERSION,
            entries: self.entries.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        fs.write(path, &bytes)
            .with_context(|| format!("persisting index to {:?}", path))?;
        debug!(path = ?path, entries = self.entries.len(), "persisted fingerprint index");
        Ok(())
    }

    fn apply(
        &mut self,
        ctx: &mut ExecutionContext,
        changes: &ChangeSet,
        recovery_only: bool,
        monitor: &BuildMonitor,
        deltas: &mut Vec<Delta>,
    ) -> Result<()> {
        for id in changes.to_process() {
            monitor.check()?;

            if !ctx.artifact_exists(id) {
                // Vanished between discovery and indexing.
                if !recovery_only {
                    if let Some(old) = self.entries.remove(id) {
                        deltas.push(Delta::removed(id.clone()).with_fingerprints(Some(old), None));
                    }
                }
                continue;
            }

            let fp = ctx.fingerprint(id)?;
            match self.entries.get(id) {
                None => {
                    deltas.push(Delta::added(id.clone()).with_fingerprints(None, Some(fp.clone())));
                    self.entries.insert(id.clone(), fp);
                }
                Some(_) if recovery_only => {}
                Some(old) if *old == fp => {}
                Some(old) => {
                    deltas.push(
                        Delta::changed(id.clone()).with_fingerprints(Some(old.clone()), Some(fp.clone())),
                    );
                    self.entries.insert(id.clone(), fp);
                }
            }
        }

        if recovery_only {
            return Ok(());
        }

        for id in changes.to_delete() {
            monitor.check()?;
            if let Some(old) = self.entries.remove(id) {
                deltas.push(Delta::removed(id.clone()).with_fingerprints(Some(old), None));
            }
        }
        Ok(())
    }
}

fn load_entries(fs: &dyn FileSystem, path: &Path) -> anyhow::Result<BTreeMap<ArtifactId, String>> {
    let bytes = fs.read(path)?;
    let doc: PersistedIndex = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing index file {:?}", path))?;
    if doc.version != INDEX_FORMAT_VERSION {
        anyhow::bail!(
            "index format version {} (expected {})",
            doc.version,
            INDEX_FORMAT_VERSION
        );
    }
    Ok(doc.entries)
}

impl Index for FingerprintIndex {
    fn known_artifacts(&self) -> BTreeSet<ArtifactId> {
        self.entries.keys().cloned().collect()
    }

    fn update<'a>(
        &'a mut self,
        project: &'a str,
        ctx: &'a mut ExecutionContext,
        changes: &'a ChangeSet,
        recovery_only: bool,
        monitor: &'a BuildMonitor,
    ) -> BoxFuture<'a, Result<Vec<Delta>>> {
        Box::pin(async move {
            let mut deltas = Vec::new();
            let outcome = self.apply(ctx, changes, recovery_only, monitor, &mut deltas);

            // Persist whatever was committed, including partial progress of a
            // cancelled update.
            self.persist()?;

            match outcome {
                Ok(()) => {
                    info!(
                        project,
                        deltas = deltas.len(),
                        recovery_only,
                        "index updated"
                    );
                    Ok(deltas)
                }
                Err(CoordinatorError::Cancelled) => {
                    info!(project, committed = deltas.len(), "index update cancelled");
                    Err(CoordinatorError::Cancelled)
                }
                Err(err) => Err(err),
            }
        })
    }

    fn clean<'a>(
        &'a mut self,
        to_delete: &'a BTreeSet<ArtifactId>,
        monitor: &'a BuildMonitor,
    ) -> BoxFuture<'a, Result<Vec<Delta>>> {
        Box::pin(async move {
            let mut deltas = Vec::new();
            let mut outcome = Ok(());
            for id in to_delete {
                if let Err(err) = monitor.check() {
                    outcome = Err(err);
                    break;
                }
                if let Some(old) = self.entries.remove(id) {
                    deltas.push(Delta::removed(id.clone()).with_fingerprints(Some(old), None));
                }
            }
            self.persist()?;
            outcome.map(|()| deltas)
        })
    }
}
