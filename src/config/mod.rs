// src/config/mod.rs

//! TOML configuration: projects, their artifact globs and dependencies, and
//! the participants registered for them.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    ConfigFile, ConfigSection, DefaultSection, ParticipantConfig, ProjectConfig, RawConfigFile,
};
