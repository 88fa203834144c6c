// src/lib.rs

pub mod build;
pub mod cancel;
pub mod change;
pub mod cli;
pub mod config;
pub mod context;
pub mod discovery;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod index;
pub mod ledger;
pub mod logging;
pub mod participant;
pub mod state;
pub mod types;
pub mod watch;
pub mod workspace;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::build::{BuildOutcome, BuildRequest};
use crate::cancel::CancelToken;
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{Runtime, RuntimeEvent};
use crate::errors::CoordinatorError;
use crate::fs::RealFileSystem;
use crate::types::{BuildFlags, RequestedKind};
use crate::workspace::Workspace;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - one coordinator per project
/// - the initial pass per project, in dependency order
/// - (optional) file watcher and runtime
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    let base = config_root_dir(&config_path);
    let workspace = Workspace::from_config(&cfg, base.clone(), Arc::new(RealFileSystem))?;

    let order = selected_projects(&cfg, args.project.as_deref())?;
    info!(?order, "projects in build order");

    let cancel = CancelToken::new();
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(256);

    // Ctrl-C -> host interruption of the running pass, then shutdown.
    {
        let tx = rt_tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            cancel.interrupt();
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let requested: RequestedKind = args.kind.into();
    let flags = BuildFlags {
        forget_state_only: args.forget_state,
        recovery: args.recovery,
    };

    let mut failures = 0usize;
    for project in order.iter() {
        if cancel.is_interrupted() {
            warn!("interrupted; skipping remaining initial passes");
            break;
        }
        let coordinator = workspace.coordinator(project)?;

        // Without a last known good state an automatic pass is a full one.
        let has_state = coordinator.has_build_state().await.unwrap_or_else(|err| {
            warn!(project = %project, error = %err, "could not read last built state; treating it as absent");
            false
        });
        let kind = if requested == RequestedKind::Auto && !has_state {
            RequestedKind::Full
        } else {
            requested
        };
        let request = BuildRequest::new(kind).with_flags(flags);

        match coordinator.build(request, &cancel).await {
            Ok(outcome) => {
                report_outcome(project, &outcome);
                if !outcome.is_success() && outcome != BuildOutcome::Interrupted {
                    failures += 1;
                }
            }
            Err(CoordinatorError::Cancelled) => {
                warn!(project = %project, "build cancelled");
                cancel.reset();
            }
            Err(err) => return Err(err.into()),
        }
    }

    if args.watch && !cancel.is_interrupted() {
        let watched = workspace
            .watched_projects()
            .into_iter()
            .filter(|p| order.contains(&p.name))
            .collect();
        let _watcher = crate::watch::spawn_watcher(base, watched, rt_tx.clone())?;

        let coordinators = workspace
            .coordinators()
            .iter()
            .filter(|(name, _)| order.contains(name))
            .map(|(name, c)| (name.clone(), Arc::clone(c)))
            .collect();
        let passes = Runtime::new(coordinators, rt_rx, cancel).run().await?;
        debug!(passes = passes.len(), "watch mode finished");
    }

    if failures > 0 {
        anyhow::bail!("{failures} project(s) failed to build");
    }
    Ok(())
}

/// The projects to build, in dependency order.
fn selected_projects(cfg: &ConfigFile, only: Option<&str>) -> Result<Vec<String>> {
    let order = cfg.build_order()?;
    match only {
        Some(name) if !order.iter().any(|p| p == name) => {
            Err(CoordinatorError::ProjectNotFound(name.to_string()).into())
        }
        Some(name) => Ok(vec![name.to_string()]),
        None => Ok(order),
    }
}

fn report_outcome(project: &str, outcome: &BuildOutcome) {
    match outcome {
        BuildOutcome::Built(report) => {
            println!(
                "{project}: {} build, {} delta(s), {} participant failure(s)",
                report.kind,
                report.deltas.len(),
                report.participant_failures.len()
            );
        }
        BuildOutcome::Skipped { kind } => println!("{project}: nothing to build ({kind})"),
        BuildOutcome::Interrupted => println!("{project}: interrupted"),
        BuildOutcome::Failed { kind, message } => {
            println!("{project}: {kind} build failed: {message}")
        }
        BuildOutcome::StateForgotten => println!("{project}: build state forgotten"),
    }
}

/// Figure out the directory project roots are relative to.
///
/// - If the config path has a non-empty parent (e.g. "configs/Incbuild.toml"),
///   we use that directory.
/// - If it's just a bare filename, we fall back to the current working
///   directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Dry-run output: projects in build order, their globs and participants.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    println!("incbuild dry-run");
    println!("  config.state_storage = {:?}", cfg.config.state_storage);
    println!("  config.interrupt_policy = {:?}", cfg.config.interrupt_policy);
    println!();

    let order = cfg.build_order()?;
    println!("projects ({}):", order.len());
    for name in order.iter() {
        let Some(project) = cfg.project.get(name) else {
            continue;
        };
        println!("  - {name}");
        println!("      root: {}", project.root_or(name));
        if !project.after.is_empty() {
            println!("      after: {:?}", project.after);
        }
        if let Some(ref include) = project.include {
            println!("      include: {:?}", include);
        }
        if let Some(ref exclude) = project.exclude {
            println!("      exclude: {:?}", exclude);
        }
        for (participant, pcfg) in cfg.participants_for(name) {
            println!("      participant {participant}: {}", pcfg.cmd);
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
