// src/ledger/registry.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::PendingChangeLedger;

/// Process-wide lookup of project ledgers.
///
/// Every registered project owns exactly one ledger for as long as it stays
/// registered; coordinators and external producers share it through `Arc`.
#[derive(Debug, Default)]
pub struct LedgerRegistry {
    ledgers: Mutex<HashMap<String, Arc<PendingChangeLedger>>>,
}

impl LedgerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ledger of `project`, created on first use.
    pub fn ledger_for(&self, project: &str) -> Arc<PendingChangeLedger> {
        let mut map = match self.ledgers.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                warn!("ledger registry mutex poisoned; recovering");
                poisoned.into_inner()
            }
        };
        Arc::clone(map.entry(project.to_string()).or_insert_with(|| {
            debug!(project, "registered ledger");
            Arc::new(PendingChangeLedger::new(project))
        }))
    }

    /// Drop the ledger of a project that is no longer registered.
    pub fn unregister(&self, project: &str) -> Option<Arc<PendingChangeLedger>> {
        let mut map = match self.ledgers.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let removed = map.remove(project);
        if removed.is_some() {
            debug!(project, "unregistered ledger");
        }
        removed
    }

    pub fn projects(&self) -> Vec<String> {
        let map = match self.ledgers.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }
}
