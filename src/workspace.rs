// src/workspace.rs

//! Assembling coordinators from a validated config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::build::Coordinator;
use crate::config::model::ConfigFile;
use crate::context::WorkspaceContextProvider;
use crate::discovery::{ArtifactFilter, ChangeDiscovery};
use crate::errors::{CoordinatorError, Result};
use crate::fs::FileSystem;
use crate::index::FingerprintIndex;
use crate::index::fingerprint::index_file_path;
use crate::ledger::LedgerRegistry;
use crate::participant::CommandParticipant;
use crate::state::state_store_for;
use crate::types::{ProjectName, StateStorageMode};
use crate::watch::WatchedProject;

/// The coordinators of every configured project.
#[derive(Debug)]
pub struct Workspace {
    base: PathBuf,
    coordinators: BTreeMap<ProjectName, Arc<Coordinator>>,
    registry: LedgerRegistry,
}

impl Workspace {
    /// Build one coordinator per project. Project roots are resolved against
    /// `base` (the config file's directory).
    pub fn from_config(cfg: &ConfigFile, base: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let base = base.into();
        let registry = LedgerRegistry::new();
        let defaults = cfg.filter_defaults();
        let mut coordinators = BTreeMap::new();

        for (name, project) in cfg.project.iter() {
            let root = base.join(project.root_or(name));
            let filter = ArtifactFilter::from_spec(&defaults, &project.filter_spec())
                .map_err(|err| CoordinatorError::ConfigError(format!("project '{name}': {err:#}")))?;
            let discovery = ChangeDiscovery::new(name.clone(), root.clone(), Arc::clone(&fs), filter);

            let mut builder = Coordinator::builder(discovery)
                .ledger(registry.ledger_for(name))
                .contexts(Arc::new(WorkspaceContextProvider::new(root.clone(), Arc::clone(&fs))))
                .boxed_state_store(state_store_for(cfg.config.state_storage, &root, Arc::clone(&fs)))
                .policy(cfg.config.interrupt_policy);

            builder = match cfg.config.state_storage {
                StateStorageMode::File => {
                    builder.index(FingerprintIndex::open(Arc::clone(&fs), index_file_path(&root, name)))
                }
                StateStorageMode::Memory => builder.index(FingerprintIndex::in_memory()),
            };

            for (participant, pcfg) in cfg.participants_for(name) {
                builder = builder.participant(
                    CommandParticipant::new(participant.clone(), pcfg.cmd.clone())
                        .skip_when_empty(pcfg.skip_when_empty),
                );
            }

            debug!(project = %name, root = ?root, "coordinator assembled");
            coordinators.insert(name.clone(), Arc::new(builder.build()?));
        }

        Ok(Self {
            base,
            coordinators,
            registry,
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn coordinator(&self, project: &str) -> Result<&Arc<Coordinator>> {
        self.coordinators
            .get(project)
            .ok_or_else(|| CoordinatorError::ProjectNotFound(project.to_string()))
    }

    pub fn coordinators(&self) -> &BTreeMap<ProjectName, Arc<Coordinator>> {
        &self.coordinators
    }

    pub fn registry(&self) -> &LedgerRegistry {
        &self.registry
    }

    /// Projects and roots for the file watcher.
    pub fn watched_projects(&self) -> Vec<WatchedProject> {
        self.coordinators
            .values()
            .map(|c| WatchedProject::new(c.project(), c.discovery().root()))
            .collect()
    }
}
