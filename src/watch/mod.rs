// src/watch/mod.rs

//! File watching.
//!
//! Wires up a cross-platform filesystem watcher (`notify`) and turns its
//! events into per-project delta trees for the runtime. It does not know
//! which files are artifacts; that is decided by change discovery.

pub mod event_handler;
pub mod path_utils;
pub mod watcher;

pub use event_handler::{WatchedProject, change_kind, delta_for_path};
pub use watcher::{WatcherHandle, spawn_watcher};
