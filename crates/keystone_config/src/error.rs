//! Error types for configuration loading and validation.

use keystone_common::ParseTargetError;

/// Errors that can occur when loading `keystone.toml` or a rule file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading a configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// A build target could not be parsed.
    #[error(transparent)]
    InvalidTarget(#[from] ParseTargetError),
}
