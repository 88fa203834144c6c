// src/build/log.rs

//! Free-text build log channel.

use tracing::info;

/// Receives human-readable progress of build passes ("Building core",
/// "Build interrupted.", error summaries, timing).
pub trait BuildLogger: Send + Sync {
    fn log(&self, message: &str);
}

/// Forwards build log lines to `tracing` under the `incbuild::build_log`
/// target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingBuildLogger;

impl BuildLogger for TracingBuildLogger {
    fn log(&self, message: &str) {
        info!(target: "incbuild::build_log", "{}", message);
    }
}
