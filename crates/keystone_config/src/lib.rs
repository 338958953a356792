//! Parsing and validation of `keystone.toml` and rule description files.
//!
//! The project file sets the key seed, the default dependency-file
//! narrowing policy and where manifests are stored. Rule description files
//! declare a single rule's target, type and key fields, and load into a
//! [`DeclaredRule`] the key factories can consume.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod rule;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use rule::{load_rule_file, parse_rule_str, parse_source_path, DeclaredRule};
pub use types::*;
