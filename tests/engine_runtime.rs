use std::collections::BTreeMap;
use std::error::Error;
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;

use incbuild::build::{BuildOutcome, BuildRequest, Coordinator};
use incbuild::cancel::CancelToken;
use incbuild::change::{ChangeKind, DeltaNode, Resource};
use incbuild::engine::{DeltaQueue, Runtime, RuntimeEvent};
use incbuild::errors::CoordinatorError;
use incbuild::state::{BuildStateStore, MemoryStateStore};
use incbuild::types::{ArtifactId, BuildKind, RequestedKind};
use incbuild_test_utils::builders::{mock_discovery, mock_project, DeltaBuilder};
use incbuild_test_utils::fakes::{MemoryIndex, RecordingParticipant};
use incbuild_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn changed(project: &str, path: &str) -> RuntimeEvent {
    RuntimeEvent::WorkspaceChanged {
        project: project.to_string(),
        delta: DeltaBuilder::project(project).changed(path).build(),
    }
}

fn artifact_paths(delta: &DeltaNode) -> Vec<(String, ChangeKind)> {
    delta
        .children
        .iter()
        .filter_map(|child| match &child.resource {
            Resource::Artifact(path) => Some((path.clone(), child.kind)),
            _ => None,
        })
        .collect()
}

struct Project {
    coordinator: Arc<Coordinator>,
    index: MemoryIndex,
    participant: RecordingParticipant,
}

fn project(name: &str, files: &[(&str, &str)]) -> Result<Project, Box<dyn Error>> {
    let root = format!("ws/{name}");
    let fs = mock_project(&root, files);
    let index = MemoryIndex::new();
    let participant = RecordingParticipant::new("recorder");
    let coordinator = Coordinator::builder(mock_discovery(name, &root, fs))
        .index(index.clone())
        .participant(participant.clone())
        .state_store(MemoryStateStore::new())
        .build()?;
    Ok(Project {
        coordinator: Arc::new(coordinator),
        index,
        participant,
    })
}

#[test]
fn queue_coalesces_per_project_in_arrival_order() {
    let mut queue = DeltaQueue::new();
    assert!(queue.is_empty());

    queue.record("app", DeltaBuilder::project("app").changed("a.txt").build());
    queue.record("lib", DeltaBuilder::project("lib").added("l.txt").build());
    queue.record("app", DeltaBuilder::project("app").removed("a.txt").build());
    assert_eq!(queue.len(), 2);
    assert!(queue.contains("lib"));

    let (first, delta) = queue.pop().expect("app queued");
    assert_eq!(first, "app");
    assert_eq!(
        artifact_paths(&delta),
        vec![
            ("a.txt".to_string(), ChangeKind::Changed),
            ("a.txt".to_string(), ChangeKind::Removed),
        ]
    );

    queue.record("app", DeltaBuilder::opened("app").build());
    let (second, _) = queue.pop().expect("lib queued");
    assert_eq!(second, "lib");
    let (third, delta) = queue.pop().expect("app queued again");
    assert_eq!(third, "app");
    assert!(delta.is_project_opened());
    assert!(queue.pop().is_none());

    queue.record("lib", DeltaNode::project("lib"));
    queue.clear();
    assert!(queue.is_empty());
}

#[test]
fn absorbed_opened_flag_is_kept() {
    let mut queue = DeltaQueue::new();
    queue.record("app", DeltaBuilder::project("app").changed("a.txt").build());
    queue.record("app", DeltaBuilder::opened("app").build());

    let (_, delta) = queue.pop().expect("app queued");
    assert!(delta.is_project_opened());
    assert_eq!(delta.node_count(), 2);
}

#[tokio::test]
async fn first_pass_without_marker_is_full_then_auto() -> TestResult {
    init_tracing();
    let app = project("app", &[("a.txt", "a"), ("b.txt", "b")])?;
    let coordinators = BTreeMap::from([("app".to_string(), Arc::clone(&app.coordinator))]);

    let (tx, rx) = mpsc::channel(16);
    tx.send(changed("app", "a.txt")).await?;
    drop(tx);
    let passes = with_timeout(Runtime::new(coordinators.clone(), rx, CancelToken::new()).run()).await?;

    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].project, "app");
    assert_eq!(passes[0].requested, RequestedKind::Full);
    let outcome = passes[0].outcome.clone()?;
    let report = outcome.report().ok_or("full pass did not complete")?;
    assert_eq!(report.kind, BuildKind::Full);
    assert_eq!(report.deltas.len(), 2);

    let (tx, rx) = mpsc::channel(16);
    tx.send(changed("app", "a.txt")).await?;
    drop(tx);
    let passes = with_timeout(Runtime::new(coordinators, rx, CancelToken::new()).run()).await?;

    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].requested, RequestedKind::Auto);
    let outcome = passes[0].outcome.clone()?;
    let report = outcome.report().ok_or("auto pass did not complete")?;
    assert_eq!(report.kind, BuildKind::Incremental);
    assert_eq!(report.processed, 1);
    assert_eq!(app.participant.call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn every_change_is_built_eventually() -> TestResult {
    init_tracing();
    let app = project("app", &[("a.txt", "a"), ("b.txt", "b"), ("c.txt", "c")])?;
    let lib = project("lib", &[("l.txt", "l")])?;
    let token = CancelToken::new();
    app.coordinator.build(BuildRequest::full(), &token).await?;
    lib.coordinator.build(BuildRequest::full(), &token).await?;
    let baseline = app.index.update_count();

    let coordinators = BTreeMap::from([
        ("app".to_string(), Arc::clone(&app.coordinator)),
        ("lib".to_string(), Arc::clone(&lib.coordinator)),
    ]);
    let (tx, rx) = mpsc::channel(16);
    tx.send(changed("app", "a.txt")).await?;
    tx.send(changed("lib", "l.txt")).await?;
    tx.send(changed("app", "b.txt")).await?;
    tx.send(changed("app", "c.txt")).await?;
    tx.send(changed("ghost", "x.txt")).await?;
    drop(tx);

    let passes = with_timeout(Runtime::new(coordinators, rx, token).run()).await?;

    assert!(!passes.is_empty());
    assert!(passes.iter().all(|p| p.requested == RequestedKind::Auto));
    assert!(passes.iter().all(|p| p.outcome.as_ref().map_or(false, BuildOutcome::is_success)));
    assert!(passes.iter().all(|p| p.project != "ghost"));

    let processed: Vec<ArtifactId> = app
        .index
        .updates()
        .iter()
        .skip(baseline)
        .flat_map(|u| u.changes.to_process().iter().cloned().collect::<Vec<_>>())
        .collect();
    for id in ["a.txt", "b.txt", "c.txt"] {
        assert!(processed.contains(&ArtifactId::new(id)), "{id} never built");
    }
    assert!(app.coordinator.ledger().pending().is_empty());
    assert!(lib.index.update_count() >= 2);
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_the_loop() -> TestResult {
    let app = project("app", &[("a.txt", "a")])?;
    let coordinators = BTreeMap::from([("app".to_string(), Arc::clone(&app.coordinator))]);

    let (tx, rx) = mpsc::channel(16);
    tx.send(RuntimeEvent::ShutdownRequested).await?;
    tx.send(changed("app", "a.txt")).await?;

    let passes = with_timeout(Runtime::new(coordinators, rx, CancelToken::new()).run()).await?;

    assert!(passes.is_empty());
    assert_eq!(app.index.update_count(), 0);
    Ok(())
}

#[tokio::test]
async fn interrupted_pass_is_recorded_and_requeued() -> TestResult {
    let app = project("app", &[("a.txt", "a"), ("b.txt", "b")])?;
    let token = CancelToken::new();
    app.coordinator.build(BuildRequest::full(), &token).await?;

    let coordinators = BTreeMap::from([("app".to_string(), Arc::clone(&app.coordinator))]);
    app.index.interrupt_after(1, token.clone());
    let (tx, rx) = mpsc::channel(16);
    tx.send(RuntimeEvent::WorkspaceChanged {
        project: "app".to_string(),
        delta: DeltaBuilder::project("app").changed("a.txt").changed("b.txt").build(),
    })
    .await?;
    drop(tx);

    let passes = with_timeout(Runtime::new(coordinators, rx, token.clone()).run()).await?;

    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].outcome, Ok(BuildOutcome::Interrupted));
    assert!(app.coordinator.ledger().pending().contains_process("b.txt"));
    Ok(())
}

/// State store whose marker can never be read.
struct UnreadableStateStore;

impl BuildStateStore for UnreadableStateStore {
    fn has_last_built(&self, _project: &str) -> Result<bool, incbuild::errors::Error> {
        Err(CoordinatorError::IoError(io::Error::other("state file unreadable")).into())
    }

    fn remember_last_built(&mut self, _project: &str, _kind: BuildKind) -> Result<(), incbuild::errors::Error> {
        Ok(())
    }

    fn forget_last_built(&mut self, _project: &str) -> Result<(), incbuild::errors::Error> {
        Ok(())
    }
}

#[tokio::test]
async fn unreadable_marker_falls_back_to_full_passes() -> TestResult {
    let fs = mock_project("ws/app", &[("a.txt", "a"), ("b.txt", "b")]);
    let index = MemoryIndex::new();
    let coordinator = Coordinator::builder(mock_discovery("app", "ws/app", fs))
        .index(index.clone())
        .state_store(UnreadableStateStore)
        .build()?;
    let coordinators = BTreeMap::from([("app".to_string(), Arc::new(coordinator))]);

    let (tx, rx) = mpsc::channel(16);
    tx.send(changed("app", "a.txt")).await?;
    drop(tx);
    let passes = with_timeout(Runtime::new(coordinators, rx, CancelToken::new()).run()).await?;

    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].requested, RequestedKind::Full);
    let outcome = passes[0].outcome.clone()?;
    assert_eq!(outcome.report().map(|r| r.kind), Some(BuildKind::Full));
    assert_eq!(index.update_count(), 1);
    Ok(())
}
