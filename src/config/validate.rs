// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::discovery::{ArtifactFilter, FilterDefaults};
use crate::errors::{CoordinatorError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = CoordinatorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

impl ConfigFile {
    /// Project names in build order: every project after the projects it
    /// lists in `after`. Ties are broken by name.
    pub fn build_order(&self) -> Result<Vec<String>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.project.keys() {
            graph.add_node(name.as_str());
        }
        for (name, project) in self.project.iter() {
            for dep in project.after.iter() {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        // Kahn's algorithm over the sorted node set keeps the order stable.
        let mut remaining: Vec<&str> = self.project.keys().map(String::as_str).collect();
        let mut order = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let ready = remaining.iter().position(|node| {
                graph
                    .neighbors_directed(*node, Direction::Incoming)
                    .all(|dep| order.iter().any(|done: &String| done == dep))
            });
            match ready {
                Some(pos) => order.push(remaining.remove(pos).to_string()),
                None => {
                    return Err(CoordinatorError::DependencyCycle(format!(
                        "cycle among projects {:?}",
                        remaining
                    )));
                }
            }
        }
        Ok(order)
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_projects(cfg)?;
    validate_project_dependencies(cfg)?;
    validate_project_graph(cfg)?;
    validate_participants(cfg)?;
    validate_globs(cfg)?;
    Ok(())
}

fn ensure_has_projects(cfg: &RawConfigFile) -> Result<()> {
    if cfg.project.is_empty() {
        return Err(CoordinatorError::ConfigError(
            "config must contain at least one [project.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_project_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, project) in cfg.project.iter() {
        for dep in project.after.iter() {
            if dep == name {
                return Err(CoordinatorError::ConfigError(format!(
                    "project '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.project.contains_key(dep) {
                return Err(CoordinatorError::ConfigError(format!(
                    "project '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_project_graph(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> project.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in cfg.project.keys() {
        graph.add_node(name.as_str());
    }
    for (name, project) in cfg.project.iter() {
        for dep in project.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(CoordinatorError::DependencyCycle(format!(
            "cycle detected in project dependencies involving project '{}'",
            cycle.node_id()
        ))),
    }
}

fn validate_participants(cfg: &RawConfigFile) -> Result<()> {
    for (name, participant) in cfg.participant.iter() {
        if participant.cmd.trim().is_empty() {
            return Err(CoordinatorError::ConfigError(format!(
                "participant '{}' has an empty `cmd`",
                name
            )));
        }
        if let Some(projects) = &participant.projects {
            for project in projects {
                if !cfg.project.contains_key(project) {
                    return Err(CoordinatorError::ProjectNotFound(format!(
                        "participant '{}' references unknown project '{}'",
                        name, project
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_globs(cfg: &RawConfigFile) -> Result<()> {
    let defaults = FilterDefaults {
        include: cfg.default.include.clone(),
        exclude: cfg.default.exclude.clone(),
    };
    for (name, project) in cfg.project.iter() {
        ArtifactFilter::from_spec(&defaults, &project.filter_spec()).map_err(|err| {
            CoordinatorError::ConfigError(format!("project '{}': {:#}", name, err))
        })?;
    }
    Ok(())
}
