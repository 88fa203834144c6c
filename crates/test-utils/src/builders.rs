#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use incbuild::change::{ChangeKind, DeltaNode};
use incbuild::config::{
    ConfigFile, ConfigSection, DefaultSection, ParticipantConfig, ProjectConfig, RawConfigFile,
};
use incbuild::discovery::{ArtifactFilter, ChangeDiscovery};
use incbuild::errors::Result;
use incbuild::fs::mock::MockFileSystem;
use incbuild::types::{InterruptPolicy, StateStorageMode};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                default: DefaultSection::default(),
                project: BTreeMap::new(),
                participant: BTreeMap::new(),
            },
        }
    }

    pub fn with_project(mut self, name: &str, project: ProjectConfig) -> Self {
        self.config.project.insert(name.to_string(), project);
        self
    }

    pub fn with_participant(mut self, name: &str, participant: ParticipantConfig) -> Self {
        self.config.participant.insert(name.to_string(), participant);
        self
    }

    pub fn with_default_include(mut self, patterns: &[&str]) -> Self {
        self.config.default.include = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_default_exclude(mut self, pattern: &str) -> Self {
        self.config.default.exclude.push(pattern.to_string());
        self
    }

    pub fn with_state_storage(mut self, mode: StateStorageMode) -> Self {
        self.config.config.state_storage = mode;
        self
    }

    pub fn with_interrupt_policy(mut self, policy: InterruptPolicy) -> Self {
        self.config.config.interrupt_policy = policy;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ProjectConfig`.
pub struct ProjectConfigBuilder {
    project: ProjectConfig,
}

impl ProjectConfigBuilder {
    pub fn new() -> Self {
        Self {
            project: ProjectConfig::default(),
        }
    }

    pub fn root(mut self, root: &str) -> Self {
        self.project.root = Some(root.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.project.after.push(dep.to_string());
        self
    }

    pub fn include(mut self, patterns: &[&str]) -> Self {
        self.project.include = Some(patterns.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn exclude(mut self, patterns: &[&str]) -> Self {
        self.project.exclude = Some(patterns.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn append_default_include(mut self) -> Self {
        self.project.append_default_include = true;
        self
    }

    pub fn append_default_exclude(mut self) -> Self {
        self.project.append_default_exclude = true;
        self
    }

    pub fn build(self) -> ProjectConfig {
        self.project
    }
}

impl Default for ProjectConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn participant(cmd: &str) -> ParticipantConfig {
    ParticipantConfig {
        cmd: cmd.to_string(),
        projects: None,
        skip_when_empty: false,
    }
}

pub fn participant_for(cmd: &str, projects: &[&str]) -> ParticipantConfig {
    ParticipantConfig {
        cmd: cmd.to_string(),
        projects: Some(projects.iter().map(|s| s.to_string()).collect()),
        skip_when_empty: false,
    }
}

/// Builder for a single-project delta tree.
pub struct DeltaBuilder {
    root: DeltaNode,
}

impl DeltaBuilder {
    pub fn project(name: &str) -> Self {
        Self {
            root: DeltaNode::project(name),
        }
    }

    /// A delta reporting the project as just opened.
    pub fn opened(name: &str) -> Self {
        Self {
            root: DeltaNode::project_opened(name),
        }
    }

    pub fn added(self, path: &str) -> Self {
        self.artifact(path, ChangeKind::Added)
    }

    pub fn changed(self, path: &str) -> Self {
        self.artifact(path, ChangeKind::Changed)
    }

    pub fn removed(self, path: &str) -> Self {
        self.artifact(path, ChangeKind::Removed)
    }

    pub fn artifact(mut self, path: &str, kind: ChangeKind) -> Self {
        self.root.push(DeltaNode::artifact(path, kind));
        self
    }

    /// A folder node with artifact children, e.g. `folder("src", &[("src/a.rs", Changed)])`.
    pub fn folder(mut self, path: &str, children: &[(&str, ChangeKind)]) -> Self {
        let mut folder = DeltaNode::folder(path, ChangeKind::Changed);
        for (child, kind) in children {
            folder.push(DeltaNode::artifact(*child, *kind));
        }
        self.root.push(folder);
        self
    }

    pub fn build(self) -> DeltaNode {
        self.root
    }
}

/// A mock file system holding `files` below `root`.
pub fn mock_project(root: &str, files: &[(&str, &str)]) -> Arc<MockFileSystem> {
    let fs = Arc::new(MockFileSystem::new());
    for (path, content) in files {
        fs.add_file(format!("{root}/{path}"), content.as_bytes().to_vec());
    }
    fs
}

/// Discovery over a mock project owning every file.
pub fn mock_discovery(project: &str, root: &str, fs: Arc<MockFileSystem>) -> ChangeDiscovery {
    ChangeDiscovery::new(
        project,
        root,
        fs,
        ArtifactFilter::accept_all().expect("accept-all filter"),
    )
}
