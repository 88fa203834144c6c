// src/change/delta.rs

//! Structural change description handed to an incremental pass.
//!
//! A delta is a tree: project nodes contain folder and artifact nodes,
//! folders contain further folders and artifacts. Paths of folder and
//! artifact nodes are relative to their project root.

use crate::types::ProjectName;

/// What kind of resource a delta node describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Project(ProjectName),
    Folder(String),
    Artifact(String),
}

/// How the resource changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// Additional markers on a delta node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaFlags {
    /// The open state of a project node toggled.
    pub open: bool,
}

/// One node in the structural delta tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaNode {
    pub resource: Resource,
    pub kind: ChangeKind,
    pub flags: DeltaFlags,
    pub children: Vec<DeltaNode>,
}

impl DeltaNode {
    /// A changed project node with no children yet.
    pub fn project(name: impl Into<ProjectName>) -> Self {
        Self {
            resource: Resource::Project(name.into()),
            kind: ChangeKind::Changed,
            flags: DeltaFlags::default(),
            children: Vec::new(),
        }
    }

    /// A project node signalling the project was just opened.
    pub fn project_opened(name: impl Into<ProjectName>) -> Self {
        Self {
            resource: Resource::Project(name.into()),
            kind: ChangeKind::Changed,
            flags: DeltaFlags { open: true },
            children: Vec::new(),
        }
    }

    pub fn folder(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            resource: Resource::Folder(path.into()),
            kind,
            flags: DeltaFlags::default(),
            children: Vec::new(),
        }
    }

    pub fn artifact(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            resource: Resource::Artifact(path.into()),
            kind,
            flags: DeltaFlags::default(),
            children: Vec::new(),
        }
    }

    /// Append a child, builder style.
    pub fn with_child(mut self, child: DeltaNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: DeltaNode) {
        self.children.push(child);
    }

    /// Returns true if this node reports that its project was just opened.
    ///
    /// A freshly opened project has no usable incremental history, so the
    /// coordinator promotes such passes to a full build.
    pub fn is_project_opened(&self) -> bool {
        matches!(self.resource, Resource::Project(_))
            && self.flags.open
            && self.kind != ChangeKind::Removed
    }

    /// Name of the project this node describes, if it is a project node.
    pub fn project_name(&self) -> Option<&str> {
        match &self.resource {
            Resource::Project(name) => Some(name),
            _ => None,
        }
    }

    /// Append the children of `later` after our own, so a traversal sees the
    /// later events last. Used to coalesce deltas for the same project.
    pub fn absorb(&mut self, later: DeltaNode) {
        self.flags.open |= later.flags.open;
        self.children.extend(later.children);
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(DeltaNode::node_count).sum::<usize>()
    }
}
