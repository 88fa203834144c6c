// src/watch/event_handler.rs

//! Turning filesystem events into per-project delta trees.

use std::path::{Path, PathBuf};

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};

use crate::change::{ChangeKind, DeltaNode};
use crate::types::ProjectName;
use crate::watch::path_utils::{is_state_path, relative_str};

/// A project the watcher reports changes for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedProject {
    pub name: ProjectName,
    pub root: PathBuf,
}

impl WatchedProject {
    pub fn new(name: impl Into<ProjectName>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }
}

/// Classify a notify event for one of its paths.
///
/// Renames and unknown kinds are resolved by whether the path still exists.
/// Access events and metadata-only changes report nothing.
pub fn change_kind(kind: &EventKind, exists: bool) -> Option<ChangeKind> {
    let by_existence = if exists {
        ChangeKind::Changed
    } else {
        ChangeKind::Removed
    };
    match kind {
        EventKind::Access(_) => None,
        EventKind::Create(_) => Some(if exists {
            ChangeKind::Added
        } else {
            ChangeKind::Removed
        }),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) if exists => Some(ChangeKind::Added),
        EventKind::Modify(_) => Some(by_existence),
        EventKind::Any | EventKind::Other => Some(by_existence),
    }
}

/// Find the project owning `path` (the one with the deepest matching root)
/// and build its delta tree for a single changed artifact.
pub fn delta_for_path(
    projects: &[WatchedProject],
    path: &Path,
    kind: ChangeKind,
) -> Option<(ProjectName, DeltaNode)> {
    let (project, rel) = projects
        .iter()
        .filter_map(|p| relative_str(&p.root, path).map(|rel| (p, rel)))
        .filter(|(_, rel)| !rel.is_empty())
        .max_by_key(|(p, _)| p.root.components().count())?;

    if is_state_path(&rel) {
        return None;
    }

    let delta = DeltaNode::project(project.name.clone()).with_child(DeltaNode::artifact(rel, kind));
    Some((project.name.clone(), delta))
}
