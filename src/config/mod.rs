// src/config/mod.rs

//! Pipeline file loading and validation.
//!
//! - `model.rs` is the TOML-backed data model.
//! - `loader.rs` reads a file from disk.
//! - `validate.rs` turns a `RawConfigFile` into a `ConfigFile`, building the
//!   tasks and their dependency graph on the way.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{
    CheckConfig, ConfigFile, ConfigSection, DefaultSection, RawConfigFile, TaskConfig,
    TaskKindConfig, WarehouseSection,
};
pub use validate::build_task;
