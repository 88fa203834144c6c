use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use incbuild::build::{BuildOutcome, BuildRequest, Coordinator};
use incbuild::cancel::CancelToken;
use incbuild::change::ChangeSet;
use incbuild::errors::CoordinatorError;
use incbuild::fs::mock::MockFileSystem;
use incbuild::index::fingerprint::index_file_path;
use incbuild::index::{DeltaKind, FingerprintIndex};
use incbuild::state::MemoryStateStore;
use incbuild::types::{BuildKind, InterruptPolicy};
use incbuild_test_utils::builders::{mock_discovery, mock_project, DeltaBuilder};
use incbuild_test_utils::fakes::{
    fingerprints, BlockingIndex, FakeContextProvider, MemoryBuildLogger, MemoryIndex, RecordingParticipant,
};
use incbuild_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const FILES: &[(&str, &str)] = &[("a.txt", "a"), ("b.txt", "b"), ("c.txt", "c"), ("d.txt", "d")];

fn all_changed() -> incbuild::change::DeltaNode {
    DeltaBuilder::project("app")
        .changed("a.txt")
        .changed("b.txt")
        .changed("c.txt")
        .changed("d.txt")
        .build()
}

fn coordinator_with(
    fs: &Arc<MockFileSystem>,
    index: MemoryIndex,
    policy: InterruptPolicy,
    with_state: bool,
) -> Result<(Coordinator, RecordingParticipant, MemoryBuildLogger), Box<dyn Error>> {
    let participant = RecordingParticipant::new("recorder");
    let logger = MemoryBuildLogger::new();
    let mut builder = Coordinator::builder(mock_discovery("app", "ws/app", fs.clone()))
        .index(index)
        .participant(participant.clone())
        .policy(policy)
        .logger(Arc::new(logger.clone()));
    if with_state {
        builder = builder.state_store(MemoryStateStore::new());
    }
    Ok((builder.build()?, participant, logger))
}

#[tokio::test]
async fn host_interrupt_of_auto_pass_requeues_and_keeps_the_marker() -> TestResult {
    init_tracing();
    let fs = mock_project("ws/app", FILES);
    let index = MemoryIndex::new();
    let (coordinator, participant, logger) =
        coordinator_with(&fs, index.clone(), InterruptPolicy::AutoOnly, true)?;
    let token = CancelToken::new();
    index.interrupt_after(2, token.clone());

    let outcome = with_timeout(coordinator.build(BuildRequest::auto(Some(all_changed())), &token)).await?;

    assert_eq!(outcome, BuildOutcome::Interrupted);
    assert!(coordinator.has_build_state().await?);
    let pending = coordinator.ledger().pending();
    assert_eq!(pending.len(), 4);
    assert!(pending.contains_process("d.txt"));
    assert!(coordinator.ledger().rebuild_required());
    assert_eq!(participant.call_count(), 0);
    assert!(logger.contains("Build interrupted."));
    Ok(())
}

#[tokio::test]
async fn host_interrupt_does_not_stop_explicit_builds_by_default() -> TestResult {
    let fs = mock_project("ws/app", FILES);
    let index = MemoryIndex::new();
    let (coordinator, participant, _) = coordinator_with(&fs, index.clone(), InterruptPolicy::AutoOnly, true)?;
    let token = CancelToken::new();
    index.interrupt_after(2, token.clone());

    let outcome = coordinator.build(BuildRequest::incremental(all_changed()), &token).await?;

    assert!(token.is_interrupted());
    assert_eq!(outcome.report().map(|r| r.deltas.len()), Some(4));
    assert_eq!(participant.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn always_policy_interrupts_explicit_builds() -> TestResult {
    let fs = mock_project("ws/app", FILES);
    let index = MemoryIndex::new();
    let (coordinator, participant, _) = coordinator_with(&fs, index.clone(), InterruptPolicy::Always, true)?;
    let token = CancelToken::new();
    index.interrupt_after(1, token.clone());

    let outcome = coordinator.build(BuildRequest::full(), &token).await?;

    assert_eq!(outcome, BuildOutcome::Interrupted);
    assert_eq!(participant.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn interrupt_without_state_store_is_a_cancellation() -> TestResult {
    let fs = mock_project("ws/app", FILES);
    let index = MemoryIndex::new();
    let (coordinator, _, _) = coordinator_with(&fs, index.clone(), InterruptPolicy::AutoOnly, false)?;
    let token = CancelToken::new();
    index.interrupt_after(1, token.clone());

    let result = coordinator.build(BuildRequest::auto(Some(all_changed())), &token).await;

    assert!(matches!(result, Err(CoordinatorError::Cancelled)));
    assert!(!coordinator.has_build_state().await?);
    assert_eq!(coordinator.ledger().pending().len(), 4);
    Ok(())
}

#[tokio::test]
async fn interrupted_pass_plus_retry_matches_one_uninterrupted_pass() -> TestResult {
    init_tracing();

    // Reference: one pass over everything.
    let reference_fs = mock_project("ws/app", FILES);
    let reference = Coordinator::builder(mock_discovery("app", "ws/app", reference_fs.clone()))
        .index(FingerprintIndex::open(reference_fs.clone(), index_file_path(Path::new("ws/app"), "app")))
        .state_store(MemoryStateStore::new())
        .build()?;
    let reference_report = reference
        .build(BuildRequest::auto(Some(all_changed())), &CancelToken::new())
        .await?
        .report()
        .cloned()
        .ok_or("reference pass did not complete")?;

    // Same workspace, interrupted after two artifacts were loaded.
    let fs = mock_project("ws/app", FILES);
    let first_token = CancelToken::new();
    let contexts = FakeContextProvider::new("ws/app", fs.clone());
    contexts.interrupt_after_loads(2, first_token.clone());
    let participant = RecordingParticipant::new("recorder");
    let coordinator = Coordinator::builder(mock_discovery("app", "ws/app", fs.clone()))
        .index(FingerprintIndex::open(fs.clone(), index_file_path(Path::new("ws/app"), "app")))
        .contexts(Arc::new(contexts.clone()))
        .participant(participant.clone())
        .state_store(MemoryStateStore::new())
        .build()?;

    let interrupted = coordinator
        .build(BuildRequest::auto(Some(all_changed())), &first_token)
        .await?;
    assert_eq!(interrupted, BuildOutcome::Interrupted);
    let committed = coordinator.known_artifacts().await;
    assert_eq!(committed.len(), 2);

    let retry = coordinator
        .build(BuildRequest::auto(Some(DeltaBuilder::project("app").build())), &CancelToken::new())
        .await?;
    let retry = retry.report().cloned().ok_or("retry did not complete")?;
    assert_eq!(retry.kind, BuildKind::Full);
    assert!(contexts.all_released());

    // What the index committed before the interruption plus the deltas of
    // the retry are exactly the deltas of the uninterrupted pass.
    let mut combined: Vec<(String, DeltaKind)> = committed
        .iter()
        .map(|id| (id.to_string(), DeltaKind::Added))
        .chain(retry.deltas.iter().map(|d| (d.id.to_string(), d.kind)))
        .collect();
    combined.sort_by(|a, b| a.0.cmp(&b.0));
    let expected: Vec<(String, DeltaKind)> = reference_report
        .deltas
        .iter()
        .map(|d| (d.id.to_string(), d.kind))
        .collect();
    assert_eq!(combined, expected);

    let ids = ["a.txt", "b.txt", "c.txt", "d.txt"];
    let persisted = FingerprintIndex::open(fs.clone(), index_file_path(Path::new("ws/app"), "app"));
    let reference_persisted =
        FingerprintIndex::open(reference_fs.clone(), index_file_path(Path::new("ws/app"), "app"));
    assert_eq!(fingerprints(&persisted, &ids), fingerprints(&reference_persisted, &ids));

    // Participants only hear about the retry.
    assert_eq!(participant.call_count(), 1);
    assert_eq!(participant.calls()[0].deltas, retry.deltas);
    Ok(())
}

#[tokio::test]
async fn changes_merged_during_a_pass_survive_commit() -> TestResult {
    init_tracing();
    let fs = mock_project("ws/app", FILES);
    let blocking = BlockingIndex::new(MemoryIndex::new());
    let coordinator = Arc::new(
        Coordinator::builder(mock_discovery("app", "ws/app", fs.clone()))
            .index(blocking.clone())
            .state_store(MemoryStateStore::new())
            .build()?,
    );

    let token = CancelToken::new();
    let pass = {
        let coordinator = Arc::clone(&coordinator);
        let token = token.clone();
        tokio::spawn(async move { coordinator.build(BuildRequest::full(), &token).await })
    };

    with_timeout(blocking.wait_entered()).await;
    assert!(coordinator.is_building());
    assert!(coordinator.ledger().is_checkpointed());

    let mut late = ChangeSet::new();
    late.update("late.txt");
    coordinator.ledger().merge_incoming(late.clone());
    blocking.release();

    let outcome = with_timeout(pass).await??;
    assert_eq!(outcome.report().map(|r| r.processed), Some(4));
    assert!(!coordinator.is_building());
    assert_eq!(coordinator.ledger().pending(), late);
    Ok(())
}

#[tokio::test]
async fn changes_merged_during_an_interrupted_pass_are_requeued() -> TestResult {
    let fs = mock_project("ws/app", FILES);
    let blocking = BlockingIndex::new(MemoryIndex::new());
    let coordinator = Arc::new(
        Coordinator::builder(mock_discovery("app", "ws/app", fs.clone()))
            .index(blocking.clone())
            .state_store(MemoryStateStore::new())
            .build()?,
    );

    let token = CancelToken::new();
    let pass = {
        let coordinator = Arc::clone(&coordinator);
        let token = token.clone();
        tokio::spawn(async move {
            coordinator
                .build(BuildRequest::auto(Some(all_changed())), &token)
                .await
        })
    };

    with_timeout(blocking.wait_entered()).await;
    let mut late = ChangeSet::new();
    late.remove("a.txt");
    coordinator.ledger().merge_incoming(late);
    token.interrupt();
    blocking.release();

    let outcome = with_timeout(pass).await??;
    assert_eq!(outcome, BuildOutcome::Interrupted);

    let pending = coordinator.ledger().pending();
    assert!(pending.contains_delete("a.txt"));
    assert!(pending.contains_process("b.txt"));
    assert!(pending.contains_process("d.txt"));
    assert_eq!(pending.len(), 4);
    Ok(())
}

#[tokio::test]
async fn dropped_pass_requeues_its_changes() -> TestResult {
    init_tracing();
    let fs = mock_project("ws/app", FILES);
    let blocking = BlockingIndex::new(MemoryIndex::new());
    let coordinator = Arc::new(
        Coordinator::builder(mock_discovery("app", "ws/app", fs.clone()))
            .index(blocking.clone())
            .state_store(MemoryStateStore::new())
            .build()?,
    );
    let mut queued = ChangeSet::new();
    queued.update("queued.txt");
    coordinator.ledger().merge_incoming(queued);

    let pass = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.build(BuildRequest::full(), &CancelToken::new()).await })
    };
    with_timeout(blocking.wait_entered()).await;
    assert!(coordinator.ledger().is_checkpointed());
    assert!(coordinator.ledger().pending().is_empty());

    pass.abort();
    let joined = with_timeout(pass).await;
    assert!(joined.is_err_and(|err| err.is_cancelled()));

    assert!(!coordinator.is_building());
    assert!(!coordinator.ledger().is_checkpointed());
    assert!(coordinator.ledger().rebuild_required());
    let pending = coordinator.ledger().pending();
    for id in ["queued.txt", "a.txt", "b.txt", "c.txt", "d.txt"] {
        assert!(pending.contains_process(id), "{id} was lost");
    }

    blocking.release();
    let outcome = with_timeout(coordinator.build(BuildRequest::auto(Some(all_changed())), &CancelToken::new())).await?;
    let report = outcome.report().ok_or("retry did not complete")?;
    assert_eq!(report.kind, BuildKind::Full);
    assert_eq!(report.processed, 5);
    assert!(coordinator.ledger().pending().is_empty());
    Ok(())
}
