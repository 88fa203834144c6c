// src/watch/watcher.rs

use std::path::PathBuf;

use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::RuntimeEvent;
use crate::watch::event_handler::{WatchedProject, change_kind, delta_for_path};

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive; dropping the handle stops
/// file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch `root` recursively and send a `RuntimeEvent::WorkspaceChanged` per
/// changed path that belongs to one of `projects`.
///
/// Which paths are artifacts is not decided here; the coordinator's
/// discovery filters the delta trees.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    projects: Vec<WatchedProject>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);

    // Project roots are compared against canonical event paths.
    let projects: Vec<WatchedProject> = projects
        .into_iter()
        .map(|p| {
            let canon = p.root.canonicalize().unwrap_or_else(|_| p.root.clone());
            WatchedProject::new(p.name, canon)
        })
        .collect();

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    eprintln!("incbuild: failed to forward notify event: {err}");
                }
            }
            Err(err) => eprintln!("incbuild: file watch error: {err}"),
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!("file watcher started on {:?}", root);

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "received notify event");
            for path in event.paths.iter() {
                if path.is_dir() {
                    continue;
                }
                let Some(kind) = change_kind(&event.kind, path.exists()) else {
                    continue;
                };
                let Some((project, delta)) = delta_for_path(&projects, path, kind) else {
                    continue;
                };
                debug!(project = %project, ?path, ?kind, "workspace change");
                if let Err(err) = runtime_tx
                    .send(RuntimeEvent::WorkspaceChanged { project, delta })
                    .await
                {
                    warn!("failed to send RuntimeEvent::WorkspaceChanged: {err}");
                    // The runtime is gone; nothing left to watch for.
                    return;
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}
