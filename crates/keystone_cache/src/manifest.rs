//! Dependency-file manifests.
//!
//! A manifest is indexed by a rule's manifest key and records, for each
//! historical build, the dependency-file key that build produced together
//! with the inputs it used and their content hashes. Before building, the
//! engine computes the manifest key, looks up a record whose inputs still
//! hash the same, and reuses that record's dependency-file key.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::Path;

use keystone_common::{ContentHash, SourcePath};
use keystone_rulekey::{DependencyEntry, FileHashLoader, RuleKey, RuleKeyAndInputs};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// All records stored under one manifest key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepFileManifest {
    /// Keystone version that wrote the manifest. Invalidate on change.
    pub keystone_version: String,

    /// Records, oldest first.
    pub entries: Vec<ManifestEntry>,
}

/// One historical build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// The dependency-file key the build produced.
    pub dep_file_key: RuleKey,

    /// The covered inputs the build used.
    pub inputs: Vec<RecordedInput>,
}

/// A used input and its content hash at the time of the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedInput {
    /// The input's dependency entry.
    pub entry: DependencyEntry,

    /// Content hash when recorded.
    pub hash: ContentHash,
}

impl ManifestEntry {
    /// Records a dependency-file key and the current hashes of its inputs.
    pub fn from_dep_file_key(
        dep_file: &RuleKeyAndInputs,
        loader: &dyn FileHashLoader,
    ) -> Result<Self, CacheError> {
        let inputs = dep_file
            .inputs
            .iter()
            .map(|path| {
                Ok(RecordedInput {
                    entry: DependencyEntry::from_source_path(path),
                    hash: loader.hash(path)?,
                })
            })
            .collect::<Result<Vec<_>, CacheError>>()?;
        Ok(Self {
            dep_file_key: dep_file.rule_key,
            inputs,
        })
    }

    /// The recorded dependency entries, i.e. the dependency file of the build.
    pub fn dep_file_entries(&self) -> Vec<DependencyEntry> {
        self.inputs.iter().map(|i| i.entry.clone()).collect()
    }
}

impl DepFileManifest {
    /// Creates an empty manifest.
    pub fn new(keystone_version: &str) -> Self {
        Self {
            keystone_version: keystone_version.to_string(),
            entries: Vec::new(),
        }
    }

    /// Loads a manifest, returning `None` if the file doesn't exist or can't
    /// be parsed.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Saves the manifest, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Returns `true` if this manifest was written by a compatible version.
    pub fn is_compatible(&self, current_version: &str) -> bool {
        self.keystone_version == current_version
    }

    /// Appends a record, keeping at most `max_entries`.
    ///
    /// A record with the same dependency-file key replaces the earlier one.
    /// The oldest records are evicted first.
    pub fn add_entry(&mut self, entry: ManifestEntry, max_entries: usize) {
        self.entries.retain(|e| e.dep_file_key != entry.dep_file_key);
        self.entries.push(entry);
        let excess = self.entries.len().saturating_sub(max_entries.max(1));
        self.entries.drain(..excess);
    }

    /// Finds the newest record whose inputs are all still present in
    /// `universe` with unchanged content.
    ///
    /// `universe` is the input set returned with the manifest key. Inputs
    /// that have disappeared from disk make a record miss; other hashing
    /// failures are returned.
    pub fn lookup(
        &self,
        loader: &dyn FileHashLoader,
        universe: &BTreeSet<SourcePath>,
    ) -> Result<Option<&ManifestEntry>, CacheError> {
        let by_entry: HashMap<DependencyEntry, &SourcePath> = universe
            .iter()
            .map(|path| (DependencyEntry::from_source_path(path), path))
            .collect();
        let mut current: HashMap<&SourcePath, Option<ContentHash>> = HashMap::new();

        'records: for record in self.entries.iter().rev() {
            for input in &record.inputs {
                let Some(path) = by_entry.get(&input.entry).copied() else {
                    continue 'records;
                };
                let hash = match current.get(path) {
                    Some(hash) => *hash,
                    None => {
                        let hash = match loader.hash(path) {
                            Ok(hash) => Some(hash),
                            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                            Err(e) => return Err(e.into()),
                        };
                        current.insert(path, hash);
                        hash
                    }
                };
                if hash != Some(input.hash) {
                    continue 'records;
                }
            }
            return Ok(Some(record));
        }
        Ok(None)
    }
}
