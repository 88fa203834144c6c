// src/cancel.rs

//! Cooperative cancellation.
//!
//! A [`CancelToken`] is shared between the host and running passes. It has
//! two independent sources:
//! - `cancel()`: the pass (or the user) gave up on its own,
//! - `interrupt()`: the host wants the build thread to stop (e.g. shutdown).
//!
//! A [`BuildMonitor`] wraps a token for one pass and decides, based on the
//! requested kind and the [`InterruptPolicy`], whether a host interruption
//! cancels that pass. Work is never pre-empted; code polls
//! [`BuildMonitor::is_cancelled`] at its suspension points.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{CoordinatorError, Result};
use crate::types::{InterruptPolicy, RequestedKind};

#[derive(Debug, Default)]
struct Flags {
    cancelled: AtomicBool,
    interrupted: AtomicBool,
}

/// Shared cancellation handle. Cloning yields a handle to the same flags.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flags: Arc<Flags>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Self-detected or user cancellation.
    pub fn cancel(&self) {
        self.flags.cancelled.store(true, Ordering::SeqCst);
    }

    /// External interruption by the host.
    pub fn interrupt(&self) {
        self.flags.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.flags.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_interrupted(&self) -> bool {
        self.flags.interrupted.load(Ordering::SeqCst)
    }

    /// Clear both sources, e.g. before the host schedules the next pass.
    pub fn reset(&self) {
        self.flags.cancelled.store(false, Ordering::SeqCst);
        self.flags.interrupted.store(false, Ordering::SeqCst);
    }
}

/// Per-pass view on a [`CancelToken`].
#[derive(Debug, Clone)]
pub struct BuildMonitor {
    token: CancelToken,
    honour_interrupts: bool,
}

impl BuildMonitor {
    pub fn new(token: CancelToken, requested: RequestedKind, policy: InterruptPolicy) -> Self {
        let honour_interrupts = match policy {
            InterruptPolicy::Always => true,
            InterruptPolicy::AutoOnly => requested == RequestedKind::Auto,
        };
        Self {
            token,
            honour_interrupts,
        }
    }

    /// A monitor that never reports cancellation.
    pub fn never() -> Self {
        Self {
            token: CancelToken::new(),
            honour_interrupts: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancel_requested() || self.is_external_interruption()
    }

    /// True when the observed cancellation comes from the host and applies to
    /// this pass.
    pub fn is_external_interruption(&self) -> bool {
        self.honour_interrupts && self.token.is_interrupted()
    }

    /// `Err(Cancelled)` if the pass should stop now.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CoordinatorError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}
