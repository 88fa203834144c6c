// src/participant/command.rs

//! Participant running a shell command once per pass.

use std::process::Stdio;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::context::ExecutionContext;
use crate::index::{Delta, DeltaKind};
use crate::types::{BoxFuture, BuildKind};

use super::Participant;

/// Runs `cmd` through the platform shell in the project root.
///
/// The deltas of the pass are exposed as newline-separated artifact lists in
/// `INCBUILD_ADDED`, `INCBUILD_CHANGED` and `INCBUILD_REMOVED`; the project
/// and kind in `INCBUILD_PROJECT` and `INCBUILD_KIND`. A non-zero exit status
/// is reported as an error.
#[derive(Debug, Clone)]
pub struct CommandParticipant {
    name: String,
    cmd: String,
    skip_when_empty: bool,
}

impl CommandParticipant {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            skip_when_empty: false,
        }
    }

    /// Do not spawn the command for a pass without deltas.
    pub fn skip_when_empty(mut self, skip: bool) -> Self {
        self.skip_when_empty = skip;
        self
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    async fn run(&self, ctx: &ExecutionContext, deltas: &[Delta], kind: BuildKind) -> Result<()> {
        if self.skip_when_empty && deltas.is_empty() {
            debug!(participant = %self.name, "no deltas; command skipped");
            return Ok(());
        }

        info!(
            participant = %self.name,
            project = %ctx.project(),
            kind = %kind,
            deltas = deltas.len(),
            cmd = %self.cmd,
            "starting participant command"
        );

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.current_dir(ctx.root())
            .env("INCBUILD_PROJECT", ctx.project())
            .env("INCBUILD_KIND", kind.as_str())
            .env("INCBUILD_ADDED", joined(deltas, DeltaKind::Added))
            .env("INCBUILD_CHANGED", joined(deltas, DeltaKind::Changed))
            .env("INCBUILD_REMOVED", joined(deltas, DeltaKind::Removed))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning command for participant '{}'", self.name))?;

        // Consume both pipes so the child never blocks on a full buffer.
        if let Some(stdout) = child.stdout.take() {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(participant = %name, "{}", line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(participant = %name, "stderr: {}", line);
                }
            });
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for command of participant '{}'", self.name))?;
        let code = status.code().unwrap_or(-1);

        info!(
            participant = %self.name,
            exit_code = code,
            success = status.success(),
            "participant command exited"
        );

        if !status.success() {
            bail!("participant '{}' command exited with code {}", self.name, code);
        }
        Ok(())
    }
}

fn joined(deltas: &[Delta], kind: DeltaKind) -> String {
    deltas
        .iter()
        .filter(|d| d.kind == kind)
        .map(|d| d.id.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

impl Participant for CommandParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    fn build<'a>(
        &'a mut self,
        ctx: &'a mut ExecutionContext,
        deltas: &'a [Delta],
        kind: BuildKind,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move { self.run(ctx, deltas, kind).await })
    }
}
