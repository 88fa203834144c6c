// src/state.rs

//! Persisted "last known good" build marker per project.
//!
//! When the marker is absent the host's next pass for that project must be a
//! full one. A successful pass records it, a failed or self-cancelled pass
//! forgets it, and an externally interrupted pass records it so the retry can
//! stay incremental (the ledger carries what is left to do).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::fs::FileSystem;
use crate::types::{BuildKind, STATE_DIR, StateStorageMode};

/// Location of the file store below a workspace root.
pub fn state_file_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join("state.json")
}

/// Abstract storage for the last-built marker.
pub trait BuildStateStore: Send + Sync {
    fn has_last_built(&self, project: &str) -> Result<bool>;
    fn remember_last_built(&mut self, project: &str, kind: BuildKind) -> Result<()>;
    fn forget_last_built(&mut self, project: &str) -> Result<()>;
}

/// Build the store selected by `mode`.
pub fn state_store_for(
    mode: StateStorageMode,
    root: &Path,
    fs: Arc<dyn FileSystem>,
) -> Box<dyn BuildStateStore> {
    match mode {
        StateStorageMode::File => Box::new(FileStateStore::new(state_file_path(root), fs)),
        StateStorageMode::Memory => Box::new(MemoryStateStore::new()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Marker {
    kind: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    projects: BTreeMap<String, Marker>,
}

/// Stores markers as JSON in `<root>/.incbuild/state.json`.
///
/// Several coordinators may share one file; every write re-reads it first.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StateFile> {
        if !self.fs.is_file(&self.path) {
            return Ok(StateFile::default());
        }
        let bytes = self.fs.read(&self.path)?;
        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(state),
            Err(err) => {
                // An unreadable marker file means "nothing known to be good".
                warn!(path = ?self.path, error = %err, "discarding unreadable build state");
                Ok(StateFile::default())
            }
        }
    }

    fn save(&self, state: &StateFile) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state).context("serializing build state")?;
        self.fs
            .write(&self.path, &bytes)
            .with_context(|| format!("writing build state to {:?}", self.path))
    }
}

impl BuildStateStore for FileStateStore {
    fn has_last_built(&self, project: &str) -> Result<bool> {
        Ok(self.load()?.projects.contains_key(project))
    }

    fn remember_last_built(&mut self, project: &str, kind: BuildKind) -> Result<()> {
        let mut state = self.load()?;
        state.projects.insert(
            project.to_string(),
            Marker {
                kind: kind.as_str().to_string(),
            },
        );
        self.save(&state)?;
        info!(project, kind = %kind, "remembered last built state (file)");
        Ok(())
    }

    fn forget_last_built(&mut self, project: &str) -> Result<()> {
        let mut state = self.load()?;
        if state.projects.remove(project).is_some() {
            self.save(&state)?;
            info!(project, "forgot last built state (file)");
        } else {
            debug!(project, "no last built state to forget");
        }
        Ok(())
    }
}

/// Stores markers in memory only.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    markers: HashMap<String, BuildKind>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_kind(&self, project: &str) -> Option<BuildKind> {
        self.markers.get(project).copied()
    }
}

impl BuildStateStore for MemoryStateStore {
    fn has_last_built(&self, project: &str) -> Result<bool> {
        Ok(self.markers.contains_key(project))
    }

    fn remember_last_built(&mut self, project: &str, kind: BuildKind) -> Result<()> {
        self.markers.insert(project.to_string(), kind);
        debug!(project, kind = %kind, "remembered last built state (memory)");
        Ok(())
    }

    fn forget_last_built(&mut self, project: &str) -> Result<()> {
        if self.markers.remove(project).is_some() {
            debug!(project, "forgot last built state (memory)");
        }
        Ok(())
    }
}
