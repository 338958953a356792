//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::path::Path;

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "keystone.toml";

/// Loads and validates `keystone.toml` from a project directory.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `keystone.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.cache.max_manifest_entries == 0 {
        return Err(ConfigError::ValidationError(
            "cache.max_manifest_entries must be at least 1".to_string(),
        ));
    }
    validate_extensions("dep_file.covered_extensions", &config.dep_file.covered_extensions)?;
    validate_extensions("dep_file.interest_extensions", &config.dep_file.interest_extensions)
}

/// Checks that extensions are bare, e.g. `h` rather than `.h`.
pub(crate) fn validate_extensions(field: &str, extensions: &[String]) -> Result<(), ConfigError> {
    for ext in extensions {
        if ext.is_empty() || ext.starts_with('.') {
            return Err(ConfigError::ValidationError(format!(
                "{field}: extension '{ext}' must be non-empty and have no leading dot"
            )));
        }
    }
    Ok(())
}
