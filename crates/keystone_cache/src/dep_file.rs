//! Reading and writing dependency files.
//!
//! A dependency file lists the inputs a rule actually used, one
//! [`DependencyEntry`] per line (`path` or `archive!member`). Blank lines and
//! lines starting with `#` are ignored. A JSON array of the same strings is
//! accepted as well.

use std::path::Path;

use keystone_rulekey::DependencyEntry;

use crate::error::CacheError;

/// Reads the entries of a dependency file.
pub fn load_dep_file(path: &Path) -> Result<Vec<DependencyEntry>, CacheError> {
    let content = std::fs::read_to_string(path).map_err(|e| CacheError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_dep_file(&content).map_err(|reason| CacheError::DepFileParse {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parses dependency file content.
pub fn parse_dep_file(content: &str) -> Result<Vec<DependencyEntry>, String> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content).map_err(|e| e.to_string());
    }
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.parse::<DependencyEntry>().map_err(|e| e.to_string()))
        .collect()
}

/// Writes entries one per line, creating parent directories.
pub fn save_dep_file(path: &Path, entries: &[DependencyEntry]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let mut content = String::new();
    for entry in entries {
        content.push_str(&entry.to_string());
        content.push('\n');
    }
    std::fs::write(path, content).map_err(|e| CacheError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
