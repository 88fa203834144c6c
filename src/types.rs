use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical project name type used throughout the coordinator.
pub type ProjectName = String;

/// Boxed future returned by the object-safe collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identifier of a tracked artifact: its path relative to the project root,
/// always with forward slashes (e.g. `src/main.rs`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn new(path: impl Into<String>) -> Self {
        let raw: String = path.into();
        let normalized = raw.replace('\\', "/");
        let trimmed = normalized.trim_start_matches("./").trim_start_matches('/');
        Self(trimmed.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactId {
    fn from(value: &str) -> Self {
        ArtifactId::new(value)
    }
}

impl From<String> for ArtifactId {
    fn from(value: String) -> Self {
        ArtifactId::new(value)
    }
}

/// Kind of a build pass after the coordinator resolved the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildKind {
    Full,
    Incremental,
    Clean,
    /// Full scan that only adds artifacts unknown to the index and skips
    /// participant notification.
    Recovery,
}

impl BuildKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildKind::Full => "FULL",
            BuildKind::Incremental => "INCREMENTAL",
            BuildKind::Clean => "CLEAN",
            BuildKind::Recovery => "RECOVERY",
        }
    }
}

impl fmt::Display for BuildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind requested by the caller.
///
/// `Auto` is what a host issues on its own (e.g. a file watcher); it behaves
/// like `Incremental` but may be interrupted by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedKind {
    Full,
    Incremental,
    Clean,
    Auto,
}

impl Default for RequestedKind {
    fn default() -> Self {
        RequestedKind::Auto
    }
}

impl fmt::Display for RequestedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestedKind::Full => "FULL",
            RequestedKind::Incremental => "INCREMENTAL",
            RequestedKind::Clean => "CLEAN",
            RequestedKind::Auto => "AUTO",
        };
        f.write_str(s)
    }
}

/// Flags accompanying a build request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildFlags {
    /// Skip the pipeline and only invalidate the persisted last-built marker.
    pub forget_state_only: bool,
    /// Resolve full passes as `BuildKind::Recovery`.
    pub recovery: bool,
}

/// Which host interruptions count as external interruptions of a pass.
///
/// - `AutoOnly`: host interrupts only cancel `Auto` requests; builds the user
///   asked for explicitly run to completion (default).
/// - `Always`: host interrupts cancel every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterruptPolicy {
    AutoOnly,
    Always,
}

impl Default for InterruptPolicy {
    fn default() -> Self {
        InterruptPolicy::AutoOnly
    }
}

impl FromStr for InterruptPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto-only" | "auto_only" => Ok(InterruptPolicy::AutoOnly),
            "always" => Ok(InterruptPolicy::Always),
            other => Err(format!(
                "invalid interrupt_policy: {other} (expected \"auto-only\" or \"always\")"
            )),
        }
    }
}

/// Where the last-built marker and the fingerprint index are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateStorageMode {
    /// Store under `<root>/.incbuild/`.
    File,
    /// Keep in memory only (lost on restart).
    Memory,
}

impl Default for StateStorageMode {
    fn default() -> Self {
        StateStorageMode::File
    }
}

/// Directory (relative to a project root) holding coordinator state.
pub const STATE_DIR: &str = ".incbuild";
