use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use incbuild::cancel::{BuildMonitor, CancelToken};
use incbuild::change::ChangeSet;
use incbuild::context::{ContextProvider, ExecutionContext};
use incbuild::errors::CoordinatorError;
use incbuild::fs::FileSystem;
use incbuild::index::fingerprint::index_file_path;
use incbuild::index::{DeltaKind, FingerprintIndex, Index};
use incbuild::types::{ArtifactId, InterruptPolicy, RequestedKind};
use incbuild_test_utils::builders::mock_project;
use incbuild_test_utils::fakes::FakeContextProvider;
use incbuild_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn process(ids: &[&str]) -> ChangeSet {
    ids.iter().copied().collect()
}

fn kinds(deltas: &[incbuild::index::Delta]) -> Vec<(&str, DeltaKind)> {
    deltas.iter().map(|d| (d.id.as_str(), d.kind)).collect()
}

#[tokio::test]
async fn reports_only_real_content_changes() -> TestResult {
    init_tracing();
    let fs = mock_project("ws/app", &[("a.txt", "one"), ("b.txt", "two")]);
    let mut ctx = ExecutionContext::new("app", "ws/app", fs.clone());
    let mut index = FingerprintIndex::in_memory();
    let monitor = BuildMonitor::never();

    let first = index.update("app", &mut ctx, &process(&["a.txt", "b.txt"]), false, &monitor).await?;
    assert_eq!(kinds(&first), vec![("a.txt", DeltaKind::Added), ("b.txt", DeltaKind::Added)]);
    assert!(first[0].old_fingerprint.is_none());
    assert!(first[0].new_fingerprint.is_some());
    assert_eq!(index.len(), 2);

    let mut ctx = ExecutionContext::new("app", "ws/app", fs.clone());
    let unchanged = index.update("app", &mut ctx, &process(&["a.txt", "b.txt"]), false, &monitor).await?;
    assert!(unchanged.is_empty());

    fs.add_file("ws/app/a.txt", "ONE");
    let mut ctx = ExecutionContext::new("app", "ws/app", fs.clone());
    let changed = index.update("app", &mut ctx, &process(&["a.txt"]), false, &monitor).await?;
    assert_eq!(kinds(&changed), vec![("a.txt", DeltaKind::Changed)]);
    assert_eq!(changed[0].old_fingerprint, first[0].new_fingerprint);
    assert_ne!(changed[0].old_fingerprint, changed[0].new_fingerprint);
    Ok(())
}

#[tokio::test]
async fn deletes_and_vanished_artifacts_are_removed() -> TestResult {
    let fs = mock_project("ws/app", &[("a.txt", "a"), ("b.txt", "b")]);
    let mut index = FingerprintIndex::in_memory();
    let monitor = BuildMonitor::never();
    let mut ctx = ExecutionContext::new("app", "ws/app", fs.clone());
    index.update("app", &mut ctx, &process(&["a.txt", "b.txt"]), false, &monitor).await?;

    fs.remove_file("ws/app/a.txt");
    let mut changes = process(&["a.txt"]);
    changes.remove("b.txt");
    changes.remove("never-known.txt");
    let mut ctx = ExecutionContext::new("app", "ws/app", fs.clone());
    let deltas = index.update("app", &mut ctx, &changes, false, &monitor).await?;

    assert_eq!(kinds(&deltas), vec![("a.txt", DeltaKind::Removed), ("b.txt", DeltaKind::Removed)]);
    assert!(deltas.iter().all(|d| d.new_fingerprint.is_none()));
    assert!(index.is_empty());
    Ok(())
}

#[tokio::test]
async fn recovery_only_adds_unknown_artifacts() -> TestResult {
    let fs = mock_project("ws/app", &[("a.txt", "a"), ("b.txt", "b")]);
    let mut index = FingerprintIndex::in_memory();
    let monitor = BuildMonitor::never();
    let mut ctx = ExecutionContext::new("app", "ws/app", fs.clone());
    index.update("app", &mut ctx, &process(&["a.txt"]), false, &monitor).await?;

    fs.add_file("ws/app/a.txt", "changed");
    let mut changes = process(&["a.txt", "b.txt"]);
    changes.remove("a-deleted.txt");
    let mut ctx = ExecutionContext::new("app", "ws/app", fs.clone());
    let deltas = index.update("app", &mut ctx, &changes, true, &monitor).await?;

    assert_eq!(kinds(&deltas), vec![("b.txt", DeltaKind::Added)]);
    assert_eq!(index.len(), 2);
    Ok(())
}

#[tokio::test]
async fn persisted_index_survives_reopen() -> TestResult {
    let fs = mock_project("ws/app", &[("a.txt", "a")]);
    let path = index_file_path(Path::new("ws/app"), "app");
    assert_eq!(path, Path::new("ws/app/.incbuild/index-app.json"));

    let mut index = FingerprintIndex::open(fs.clone(), path.clone());
    assert!(index.is_empty());
    let mut ctx = ExecutionContext::new("app", "ws/app", fs.clone());
    index.update("app", &mut ctx, &process(&["a.txt"]), false, &BuildMonitor::never()).await?;
    let fingerprint = index.fingerprint_of(&ArtifactId::new("a.txt")).map(str::to_string);

    let reopened = FingerprintIndex::open(fs.clone(), path);
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.fingerprint_of(&ArtifactId::new("a.txt")).map(str::to_string), fingerprint);
    Ok(())
}

#[test]
fn unreadable_index_file_starts_empty() {
    let fs = mock_project("ws/app", &[(".incbuild/index-app.json", "{ not json")]);
    let index = FingerprintIndex::open(fs.clone(), index_file_path(Path::new("ws/app"), "app"));
    assert!(index.is_empty());

    let future_version = r#"{"version": 99, "entries": {"a.txt": "abc"}}"#;
    fs.add_file("ws/app/.incbuild/index-app.json", future_version);
    let index = FingerprintIndex::open(fs, index_file_path(Path::new("ws/app"), "app"));
    assert!(index.is_empty());
}

#[tokio::test]
async fn clean_forgets_requested_entries() -> TestResult {
    let fs = mock_project("ws/app", &[("a.txt", "a"), ("b.txt", "b")]);
    let path = index_file_path(Path::new("ws/app"), "app");
    let mut index = FingerprintIndex::open(fs.clone(), path.clone());
    let monitor = BuildMonitor::never();
    let mut ctx = ExecutionContext::new("app", "ws/app", fs.clone());
    index.update("app", &mut ctx, &process(&["a.txt", "b.txt"]), false, &monitor).await?;

    let known = index.known_artifacts();
    let deltas = index.clean(&known, &monitor).await?;

    assert_eq!(kinds(&deltas), vec![("a.txt", DeltaKind::Removed), ("b.txt", DeltaKind::Removed)]);
    assert!(FingerprintIndex::open(fs, path).is_empty());
    Ok(())
}

#[tokio::test]
async fn cancelled_update_keeps_committed_progress() -> TestResult {
    let fs = mock_project("ws/app", &[("a.txt", "a"), ("b.txt", "b"), ("c.txt", "c")]);
    let path = index_file_path(Path::new("ws/app"), "app");
    let token = CancelToken::new();
    let provider = FakeContextProvider::new("ws/app", fs.clone());
    provider.interrupt_after_loads(1, token.clone());
    let mut ctx = provider.acquire("app")?;
    let monitor = BuildMonitor::new(token, RequestedKind::Auto, InterruptPolicy::AutoOnly);

    let mut index = FingerprintIndex::open(fs.clone(), path.clone());
    let result = index
        .update("app", &mut ctx, &process(&["a.txt", "b.txt", "c.txt"]), false, &monitor)
        .await;

    assert!(matches!(result, Err(CoordinatorError::Cancelled)));
    assert_eq!(index.len(), 1);
    assert!(fs.is_file(&path));
    assert_eq!(FingerprintIndex::open(fs.clone(), path).len(), 1);
    Ok(())
}

#[test]
fn context_caches_fingerprints_until_released() -> TestResult {
    let fs: Arc<dyn FileSystem> = mock_project("ws/app", &[("a.txt", "a")]);
    let mut ctx = ExecutionContext::new("app", "ws/app", fs);
    let id = ArtifactId::new("a.txt");

    let first = ctx.fingerprint(&id)?;
    assert_eq!(ctx.fingerprint(&id)?, first);
    assert_eq!(ctx.cached_count(), 1);
    assert!(ctx.fingerprint(&ArtifactId::new("missing.txt")).is_err());

    ctx.release();
    assert!(ctx.is_released());
    assert_eq!(ctx.cached_count(), 0);
    assert_eq!(ctx.listener_count(), 0);
    Ok(())
}
