#![cfg(unix)]

use std::error::Error;
use std::fs;
use std::sync::Arc;

use tempfile::tempdir;

use incbuild::context::ExecutionContext;
use incbuild::fs::RealFileSystem;
use incbuild::index::Delta;
use incbuild::participant::{CommandParticipant, Participant};
use incbuild::types::BuildKind;
use incbuild_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn command_sees_deltas_in_its_environment() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let mut ctx = ExecutionContext::new("core", dir.path(), Arc::new(RealFileSystem));
    let mut participant = CommandParticipant::new(
        "dump",
        "printf '%s|%s|%s|%s|%s' \"$INCBUILD_PROJECT\" \"$INCBUILD_KIND\" \"$INCBUILD_ADDED\" \"$INCBUILD_CHANGED\" \"$INCBUILD_REMOVED\" > out.txt",
    );
    let deltas = vec![
        Delta::added("src/a.rs"),
        Delta::added("src/b.rs"),
        Delta::changed("lib.rs"),
        Delta::removed("old.rs"),
    ];

    with_timeout(participant.build(&mut ctx, &deltas, BuildKind::Incremental)).await?;

    let out = fs::read_to_string(dir.path().join("out.txt"))?;
    assert_eq!(out, "core|INCREMENTAL|src/a.rs\nsrc/b.rs|lib.rs|old.rs");
    assert_eq!(participant.name(), "dump");
    Ok(())
}

#[tokio::test]
async fn failing_command_is_an_error() -> TestResult {
    let dir = tempdir()?;
    let mut ctx = ExecutionContext::new("core", dir.path(), Arc::new(RealFileSystem));
    let mut participant = CommandParticipant::new("broken", "exit 3");

    let err = with_timeout(participant.build(&mut ctx, &[], BuildKind::Full))
        .await
        .expect_err("exit 3 must fail");

    assert!(err.to_string().contains("code 3"), "unexpected error: {err}");
    Ok(())
}

#[tokio::test]
async fn empty_passes_can_skip_the_command() -> TestResult {
    let dir = tempdir()?;
    let mut ctx = ExecutionContext::new("core", dir.path(), Arc::new(RealFileSystem));
    let mut participant = CommandParticipant::new("quiet", "exit 1").skip_when_empty(true);

    with_timeout(participant.build(&mut ctx, &[], BuildKind::Clean)).await?;

    let deltas = vec![Delta::removed("a.rs")];
    assert!(with_timeout(participant.build(&mut ctx, &deltas, BuildKind::Clean)).await.is_err());
    assert_eq!(participant.cmd(), "exit 1");
    Ok(())
}

fn assert_shareable<T: Send + Sync>() {}

#[tokio::test]
async fn command_runs_on_a_spawned_task() -> TestResult {
    assert_shareable::<ExecutionContext>();

    let dir = tempdir()?;
    let root = dir.path().to_path_buf();
    let handle = tokio::spawn(async move {
        let mut ctx = ExecutionContext::new("core", root, Arc::new(RealFileSystem));
        let mut participant = CommandParticipant::new("touch", "echo done > spawned.txt");
        participant
            .build(&mut ctx, &[Delta::added("a.rs")], BuildKind::Full)
            .await
    });

    with_timeout(handle).await??;
    assert_eq!(fs::read_to_string(dir.path().join("spawned.txt"))?, "done\n");
    Ok(())
}
