#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use incbuild::build::BuildLogger;
use incbuild::cancel::{BuildMonitor, CancelToken};
use incbuild::change::ChangeSet;
use incbuild::context::{ContextListener, ContextProvider, ExecutionContext};
use incbuild::errors::{CoordinatorError, Result};
use incbuild::fs::FileSystem;
use incbuild::index::{Delta, Index};
use incbuild::participant::Participant;
use incbuild::types::{ArtifactId, BoxFuture, BuildKind};

/// One recorded `Index::update` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCall {
    pub changes: ChangeSet,
    pub recovery_only: bool,
}

#[derive(Debug, Default)]
struct MemoryIndexState {
    known: BTreeSet<ArtifactId>,
    updates: Vec<UpdateCall>,
    cleans: Vec<BTreeSet<ArtifactId>>,
    fail_next: Option<String>,
    /// Interrupt `token` once this many artifacts were committed in a call.
    interrupt_after: Option<(usize, CancelToken)>,
}

/// Index fake reporting `Added` for unknown and `Changed` for known
/// artifacts, without looking at content. Clones share their state.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    state: Arc<Mutex<MemoryIndexState>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known(ids: &[&str]) -> Self {
        let index = Self::new();
        index.state.lock().unwrap().known = ids.iter().map(|id| ArtifactId::new(*id)).collect();
        index
    }

    pub fn known(&self) -> BTreeSet<ArtifactId> {
        self.state.lock().unwrap().known.clone()
    }

    pub fn updates(&self) -> Vec<UpdateCall> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn update_count(&self) -> usize {
        self.state.lock().unwrap().updates.len()
    }

    pub fn cleans(&self) -> Vec<BTreeSet<ArtifactId>> {
        self.state.lock().unwrap().cleans.clone()
    }

    /// Make the next `update` fail with `message`.
    pub fn fail_next(&self, message: &str) {
        self.state.lock().unwrap().fail_next = Some(message.to_string());
    }

    /// Interrupt `token` after `n` artifacts were committed by one call.
    pub fn interrupt_after(&self, n: usize, token: CancelToken) {
        self.state.lock().unwrap().interrupt_after = Some((n, token));
    }

    fn apply(&self, changes: &ChangeSet, recovery_only: bool, monitor: &BuildMonitor) -> Result<Vec<Delta>> {
        let mut state = self.state.lock().unwrap();
        state.updates.push(UpdateCall {
            changes: changes.clone(),
            recovery_only,
        });
        if let Some(message) = state.fail_next.take() {
            return Err(anyhow::anyhow!(message).into());
        }

        let mut deltas = Vec::new();
        let mut committed = 0usize;
        for id in changes.to_process() {
            monitor.check()?;
            if state.known.insert(id.clone()) {
                deltas.push(Delta::added(id.clone()));
            } else if !recovery_only {
                deltas.push(Delta::changed(id.clone()));
            }
            committed += 1;
            if let Some((n, token)) = &state.interrupt_after {
                if committed == *n {
                    token.interrupt();
                }
            }
        }
        if !recovery_only {
            for id in changes.to_delete() {
                monitor.check()?;
                if state.known.remove(id) {
                    deltas.push(Delta::removed(id.clone()));
                }
            }
        }
        Ok(deltas)
    }
}

impl Index for MemoryIndex {
    fn known_artifacts(&self) -> BTreeSet<ArtifactId> {
        self.known()
    }

    fn update<'a>(
        &'a mut self,
        _project: &'a str,
        _ctx: &'a mut ExecutionContext,
        changes: &'a ChangeSet,
        recovery_only: bool,
        monitor: &'a BuildMonitor,
    ) -> BoxFuture<'a, Result<Vec<Delta>>> {
        Box::pin(async move { self.apply(changes, recovery_only, monitor) })
    }

    fn clean<'a>(
        &'a mut self,
        to_delete: &'a BTreeSet<ArtifactId>,
        monitor: &'a BuildMonitor,
    ) -> BoxFuture<'a, Result<Vec<Delta>>> {
        Box::pin(async move {
            monitor.check()?;
            let mut state = self.state.lock().unwrap();
            state.cleans.push(to_delete.clone());
            let mut deltas = Vec::new();
            for id in to_delete {
                if state.known.remove(id) {
                    deltas.push(Delta::removed(id.clone()));
                }
            }
            Ok(deltas)
        })
    }
}

/// Index wrapper that parks inside `update` until released, so tests can
/// act while a pass is in EXECUTE.
#[derive(Debug, Clone)]
pub struct BlockingIndex {
    inner: MemoryIndex,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl BlockingIndex {
    pub fn new(inner: MemoryIndex) -> Self {
        Self {
            inner,
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    /// Resolves once a pass is parked inside `update`.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

impl Index for BlockingIndex {
    fn known_artifacts(&self) -> BTreeSet<ArtifactId> {
        self.inner.known()
    }

    fn update<'a>(
        &'a mut self,
        project: &'a str,
        ctx: &'a mut ExecutionContext,
        changes: &'a ChangeSet,
        recovery_only: bool,
        monitor: &'a BuildMonitor,
    ) -> BoxFuture<'a, Result<Vec<Delta>>> {
        Box::pin(async move {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner
                .update(project, ctx, changes, recovery_only, monitor)
                .await
        })
    }

    fn clean<'a>(
        &'a mut self,
        to_delete: &'a BTreeSet<ArtifactId>,
        monitor: &'a BuildMonitor,
    ) -> BoxFuture<'a, Result<Vec<Delta>>> {
        self.inner.clean(to_delete, monitor)
    }
}

/// One recorded `Participant::build` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantCall {
    pub kind: BuildKind,
    pub deltas: Vec<Delta>,
}

/// Participant recording every call. Clones share their records; `journal`
/// can be shared between participants to check notification order.
#[derive(Debug, Clone)]
pub struct RecordingParticipant {
    name: String,
    calls: Arc<Mutex<Vec<ParticipantCall>>>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl RecordingParticipant {
    pub fn new(name: &str) -> Self {
        Self::with_journal(name, Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_journal(name: &str, journal: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
            journal,
        }
    }

    pub fn calls(&self) -> Vec<ParticipantCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Participant for RecordingParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    fn build<'a>(
        &'a mut self,
        _ctx: &'a mut ExecutionContext,
        deltas: &'a [Delta],
        kind: BuildKind,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(ParticipantCall {
                kind,
                deltas: deltas.to_vec(),
            });
            self.journal.lock().unwrap().push(self.name.clone());
            Ok(())
        })
    }
}

/// Participant that always fails.
#[derive(Debug, Clone)]
pub struct FailingParticipant {
    name: String,
    calls: Arc<AtomicUsize>,
}

impl FailingParticipant {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Participant for FailingParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    fn build<'a>(
        &'a mut self,
        _ctx: &'a mut ExecutionContext,
        _deltas: &'a [Delta],
        _kind: BuildKind,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("participant {} exploded", self.name)
        })
    }
}

/// Listener that interrupts a token after a number of artifact loads.
struct InterruptAfterLoads {
    remaining: usize,
    token: CancelToken,
}

impl ContextListener for InterruptAfterLoads {
    fn artifact_loaded(&mut self, _id: &ArtifactId, _fingerprint: &str) {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.token.interrupt();
        }
    }
}

/// Listener flipping a flag when it is dropped, i.e. when the context
/// detaches its listeners.
struct ReleaseFlag {
    released: Arc<AtomicBool>,
}

impl ContextListener for ReleaseFlag {
    fn artifact_loaded(&mut self, _id: &ArtifactId, _fingerprint: &str) {}
}

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    acquired: usize,
    released: Vec<Arc<AtomicBool>>,
    fail: bool,
    interrupt_after_loads: Option<(usize, CancelToken)>,
}

/// Context provider over a (mock) file system that counts acquisitions,
/// checks release and can fail or interrupt on demand.
#[derive(Debug, Clone)]
pub struct FakeContextProvider {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    state: Arc<Mutex<ProviderState>>,
}

impl FakeContextProvider {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    /// Every further `acquire` fails.
    pub fn fail_acquire(&self) {
        self.state.lock().unwrap().fail = true;
    }

    /// Contexts interrupt `token` after `n` artifact contents were loaded.
    pub fn interrupt_after_loads(&self, n: usize, token: CancelToken) {
        self.state.lock().unwrap().interrupt_after_loads = Some((n, token));
    }

    pub fn acquired(&self) -> usize {
        self.state.lock().unwrap().acquired
    }

    /// True when every context handed out so far was released.
    pub fn all_released(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .released
            .iter()
            .all(|flag| flag.load(Ordering::SeqCst))
    }
}

impl ContextProvider for FakeContextProvider {
    fn acquire(&self, project: &str) -> Result<ExecutionContext> {
        let mut state = self.state.lock().unwrap();
        if state.fail {
            return Err(CoordinatorError::ContextUnavailable {
                project: project.to_string(),
                reason: "workspace unavailable".to_string(),
            });
        }
        state.acquired += 1;

        let mut ctx = ExecutionContext::new(project, self.root.clone(), Arc::clone(&self.fs));
        let released = Arc::new(AtomicBool::new(false));
        ctx.subscribe(Box::new(ReleaseFlag {
            released: Arc::clone(&released),
        }));
        state.released.push(released);

        if let Some((n, token)) = &state.interrupt_after_loads {
            ctx.subscribe(Box::new(InterruptAfterLoads {
                remaining: *n,
                token: token.clone(),
            }));
        }
        Ok(ctx)
    }
}

/// Build logger keeping every line.
#[derive(Debug, Clone, Default)]
pub struct MemoryBuildLogger {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryBuildLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl BuildLogger for MemoryBuildLogger {
    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

/// Artifacts and fingerprints of a persisted index, for assertions.
pub fn fingerprints(index: &incbuild::index::FingerprintIndex, ids: &[&str]) -> BTreeMap<String, Option<String>> {
    ids.iter()
        .map(|id| {
            (
                id.to_string(),
                index.fingerprint_of(&ArtifactId::new(*id)).map(str::to_string),
            )
        })
        .collect()
}
