//! Configuration types deserialized from `keystone.toml`.

use serde::Deserialize;

/// The top-level project configuration parsed from `keystone.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Rule key settings.
    #[serde(default)]
    pub rulekey: RuleKeyConfig,
    /// Default dependency-file narrowing policy.
    #[serde(default)]
    pub dep_file: DepFileConfig,
    /// Manifest storage settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Core project metadata required in every `keystone.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
}

/// Rule key settings.
#[derive(Debug, Default, Deserialize)]
pub struct RuleKeyConfig {
    /// Folded into every key. Changing it invalidates all keys.
    #[serde(default)]
    pub seed: i64,
}

/// Which inputs dependency files may narrow.
///
/// Extensions are given without the leading dot. Rule files may override
/// either list.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DepFileConfig {
    /// Inputs with these extensions are covered by dependency files.
    #[serde(default)]
    pub covered_extensions: Vec<String>,
    /// Covered inputs with these extensions still affect the key by their
    /// existence when unused.
    #[serde(default)]
    pub interest_extensions: Vec<String>,
}

/// Manifest storage settings.
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Storage directory, relative to the project root.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    /// Records kept per manifest key.
    #[serde(default = "default_max_manifest_entries")]
    pub max_manifest_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_manifest_entries: default_max_manifest_entries(),
        }
    }
}

fn default_cache_dir() -> String {
    ".keystone".to_string()
}

fn default_max_manifest_entries() -> usize {
    16
}
