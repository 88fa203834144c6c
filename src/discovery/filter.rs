// src/discovery/filter.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::types::STATE_DIR;

/// Default include/exclude globs from the `[default]` config section.
#[derive(Debug, Clone, Default)]
pub struct FilterDefaults {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Raw per-project glob patterns.
///
/// - `include` / `exclude` are optional project-local lists.
/// - `append_default_include` / `append_default_exclude` control whether the
///   project lists are merged with the default lists.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub append_default_include: bool,
    pub append_default_exclude: bool,
}

/// Decides which paths (relative to a project root) are artifacts owned by
/// the coordinator. Everything else is skipped without error.
#[derive(Clone)]
pub struct ArtifactFilter {
    include_set: GlobSet,
    exclude_set: Option<GlobSet>,
    include_count: usize,
}

impl fmt::Debug for ArtifactFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactFilter")
            .field("include_count", &self.include_count)
            .finish_non_exhaustive()
    }
}

impl ArtifactFilter {
    /// Build a filter applying the default + append rules:
    ///
    /// - `append_default_include = true`: `project.include + default.include`.
    /// - Else, if `project.include` is set, only that.
    /// - Else, `default.include`.
    ///
    /// Same rules for `exclude`.
    pub fn from_spec(defaults: &FilterDefaults, spec: &FilterSpec) -> Result<Self> {
        let include = effective_patterns(
            spec.include.as_ref(),
            &defaults.include,
            spec.append_default_include,
        );
        let exclude = effective_patterns(
            spec.exclude.as_ref(),
            &defaults.exclude,
            spec.append_default_exclude,
        );
        Self::new(&include, &exclude)
    }

    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include_set = build_globset(include).context("building include globset")?;
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };
        Ok(Self {
            include_set,
            exclude_set,
            include_count: include.len(),
        })
    }

    /// A filter that owns every file (except coordinator state).
    pub fn accept_all() -> Result<Self> {
        Self::new(&["**".to_string()], &[])
    }

    /// Returns true if `rel_path` (e.g. `"src/foo.rs"`) is an owned artifact.
    pub fn matches(&self, rel_path: &str) -> bool {
        let rel_path = rel_path.trim_start_matches("./");
        if rel_path == STATE_DIR || rel_path.starts_with(&format!("{STATE_DIR}/")) {
            return false;
        }
        if !self.include_set.is_match(rel_path) {
            return false;
        }
        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

fn effective_patterns(
    project_list: Option<&Vec<String>>,
    default_list: &[String],
    append_default: bool,
) -> Vec<String> {
    match (project_list, append_default) {
        (Some(list), true) => {
            let mut combined = list.clone();
            combined.extend(default_list.iter().cloned());
            combined
        }
        (Some(list), false) => list.clone(),
        (None, _) => default_list.to_vec(),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
