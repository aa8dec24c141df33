// src/config/mod.rs

//! Options file loading and validation.
//!
//! - [`model`] is the TOML data model.
//! - [`loader`] reads a file from disk.
//! - [`validate`] turns the raw model into runtime options.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, RawApplySection, RawConfigFile, RawDestroySection, RawPollSection};
