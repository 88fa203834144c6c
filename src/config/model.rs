// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::discovery::{FilterDefaults, FilterSpec};
use crate::types::{InterruptPolicy, StateStorageMode};

/// Configuration exactly as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// state_storage = "file"
/// interrupt_policy = "auto-only"
///
/// [default]
/// include = ["src/**/*.rs"]
///
/// [project.core]
/// root = "core"
///
/// [project.app]
/// after = ["core"]
///
/// [participant.lint]
/// cmd = "echo $INCBUILD_CHANGED"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub default: DefaultSection,

    #[serde(default)]
    pub project: BTreeMap<String, ProjectConfig>,

    #[serde(default)]
    pub participant: BTreeMap<String, ParticipantConfig>,
}

/// Validated configuration. Only obtainable through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub default: DefaultSection,
    pub project: BTreeMap<String, ProjectConfig>,
    pub participant: BTreeMap<String, ParticipantConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            default: raw.default,
            project: raw.project,
            participant: raw.participant,
        }
    }

    pub fn filter_defaults(&self) -> FilterDefaults {
        FilterDefaults {
            include: self.default.include.clone(),
            exclude: self.default.exclude.clone(),
        }
    }

    /// Participants registered for `project`, in name order.
    pub fn participants_for<'a>(
        &'a self,
        project: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a ParticipantConfig)> + 'a {
        self.participant
            .iter()
            .filter(move |(_, p)| p.applies_to(project))
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigSection {
    /// Where the last-built markers and indexes live (`"file"` by default).
    #[serde(default)]
    pub state_storage: StateStorageMode,

    /// Which host interruptions cancel a pass (`"auto-only"` by default).
    #[serde(default)]
    pub interrupt_policy: InterruptPolicy,
}

/// `[default]` section: artifact globs for projects that do not override them.
///
/// Without any `include` every file below a project root is an artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultSection {
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_include() -> Vec<String> {
    vec!["**".to_string()]
}

impl Default for DefaultSection {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: Vec::new(),
        }
    }
}

/// `[project.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    /// Project root, relative to the config file's directory. Defaults to
    /// the project name.
    #[serde(default)]
    pub root: Option<String>,

    /// If `None`, `default.include` is used.
    #[serde(default)]
    pub include: Option<Vec<String>>,

    /// If `None`, `default.exclude` is used.
    #[serde(default)]
    pub exclude: Option<Vec<String>>,

    #[serde(default)]
    pub append_default_include: bool,

    #[serde(default)]
    pub append_default_exclude: bool,

    /// Projects that must be built before this one.
    #[serde(default)]
    pub after: Vec<String>,
}

impl ProjectConfig {
    pub fn root_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.root.as_deref().unwrap_or(name)
    }

    pub fn filter_spec(&self) -> FilterSpec {
        FilterSpec {
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            append_default_include: self.append_default_include,
            append_default_exclude: self.append_default_exclude,
        }
    }
}

/// `[participant.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantConfig {
    /// Shell command run once per pass.
    pub cmd: String,

    /// Projects this participant is registered for; all when omitted.
    #[serde(default)]
    pub projects: Option<Vec<String>>,

    /// Do not run the command for passes without deltas.
    #[serde(default)]
    pub skip_when_empty: bool,
}

impl ParticipantConfig {
    pub fn applies_to(&self, project: &str) -> bool {
        match &self.projects {
            Some(projects) => projects.iter().any(|p| p == project),
            None => true,
        }
    }
}
