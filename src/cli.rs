// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::RequestedKind;

/// Command-line arguments for `incbuild`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "incbuild",
    version,
    about = "Incremental build coordinator: index changed artifacts and notify participants.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Incbuild.toml")]
    pub config: String,

    /// Kind of the initial pass for every project.
    ///
    /// `auto` runs an incremental pass when a last built state exists and a
    /// full one otherwise.
    #[arg(long, value_enum, value_name = "KIND", default_value_t = KindArg::Auto)]
    pub kind: KindArg,

    /// Run full passes as recovery: only add artifacts unknown to the index,
    /// without notifying participants.
    #[arg(long)]
    pub recovery: bool,

    /// Only forget the last built state, so the next pass is full.
    #[arg(long, conflicts_with_all = ["recovery", "watch"])]
    pub forget_state: bool,

    /// Keep running and build on file changes.
    #[arg(long)]
    pub watch: bool,

    /// Only build this project.
    #[arg(long, value_name = "NAME")]
    pub project: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `INCBUILD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse and validate the config, print the projects, build nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Build kind as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Full,
    Incremental,
    Clean,
    Auto,
}

impl From<KindArg> for RequestedKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Full => RequestedKind::Full,
            KindArg::Incremental => RequestedKind::Incremental,
            KindArg::Clean => RequestedKind::Clean,
            KindArg::Auto => RequestedKind::Auto,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
