// src/context.rs

//! Execution context of one build pass.
//!
//! A context is the resolution environment the index and participants share
//! while a pass runs: it knows where artifacts live, caches their content
//! fingerprints and notifies subscribed listeners when an artifact is loaded.
//! It is owned by exactly one build run and released at the end of the pass
//! on every path, so no cached state or listener leaks into the next pass.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use blake3::Hasher;
use tracing::debug;

use crate::errors::Result as CoordResult;
use crate::fs::FileSystem;
use crate::types::{ArtifactId, ProjectName};

/// Observer attached to a context for the duration of a pass.
pub trait ContextListener: Send + Sync {
    /// Called the first time an artifact's content is loaded in this pass.
    fn artifact_loaded(&mut self, id: &ArtifactId, fingerprint: &str);
}

/// Compute the blake3 fingerprint of a file.
pub fn compute_fingerprint(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut reader = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Resolution environment of one pass.
pub struct ExecutionContext {
    project: ProjectName,
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    fingerprints: HashMap<ArtifactId, String>,
    listeners: Vec<Box<dyn ContextListener>>,
    released: bool,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("project", &self.project)
            .field("root", &self.root)
            .field("cached", &self.fingerprints.len())
            .field("listeners", &self.listeners.len())
            .field("released", &self.released)
            .finish()
    }
}

impl ExecutionContext {
    pub fn new(project: impl Into<ProjectName>, root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            project: project.into(),
            root: root.into(),
            fs,
            fingerprints: HashMap::new(),
            listeners: Vec::new(),
            released: false,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// Absolute (or root-relative) location of an artifact.
    pub fn artifact_path(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn artifact_exists(&self, id: &ArtifactId) -> bool {
        self.fs.is_file(&self.artifact_path(id))
    }

    /// Fingerprint of an artifact's current content, cached for the pass.
    pub fn fingerprint(&mut self, id: &ArtifactId) -> Result<String> {
        if let Some(fp) = self.fingerprints.get(id) {
            return Ok(fp.clone());
        }
        let fp = compute_fingerprint(self.fs.as_ref(), &self.artifact_path(id))?;
        for listener in self.listeners.iter_mut() {
            listener.artifact_loaded(id, &fp);
        }
        self.fingerprints.insert(id.clone(), fp.clone());
        Ok(fp)
    }

    pub fn subscribe(&mut self, listener: Box<dyn ContextListener>) {
        self.listeners.push(listener);
    }

    pub fn cached_count(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Detach listeners and clear cached state. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        debug!(
            project = %self.project,
            cached = self.fingerprints.len(),
            listeners = self.listeners.len(),
            "releasing execution context"
        );
        self.listeners.clear();
        self.fingerprints.clear();
        self.released = true;
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.release();
    }
}

/// Hands out a fresh execution context for every pass.
///
/// Acquisition is assumed to be expensive; the coordinator only asks for a
/// context once it knows there is work to do.
pub trait ContextProvider: Send + Sync {
    fn acquire(&self, project: &str) -> CoordResult<ExecutionContext>;
}

/// Contexts over a file system rooted at the project's directory.
#[derive(Debug, Clone)]
pub struct WorkspaceContextProvider {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl WorkspaceContextProvider {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }
}

impl ContextProvider for WorkspaceContextProvider {
    fn acquire(&self, project: &str) -> CoordResult<ExecutionContext> {
        Ok(ExecutionContext::new(project, self.root.clone(), Arc::clone(&self.fs)))
    }
}
