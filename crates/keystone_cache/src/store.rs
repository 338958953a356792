//! On-disk manifest storage.
//!
//! The [`ManifestStore`] keeps one [`DepFileManifest`] per manifest key under
//! `<cache_dir>/manifests/<key>.json`. Reads are fail-safe: a missing,
//! corrupt, or version-mismatched manifest is treated as empty.

use std::path::{Path, PathBuf};

use keystone_rulekey::{FileHashLoader, RuleKey, RuleKeyAndInputs};
use tracing::debug;

use crate::error::CacheError;
use crate::manifest::{DepFileManifest, ManifestEntry};

/// Subdirectory holding manifests.
const MANIFEST_SUBDIR: &str = "manifests";

/// Manifest persistence for dependency-file keys.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    /// Root cache directory.
    cache_dir: PathBuf,

    /// Version written into manifests and required on load.
    keystone_version: String,

    /// Records kept per manifest.
    max_entries: usize,
}

impl ManifestStore {
    /// Creates a store rooted at `cache_dir`.
    pub fn new(cache_dir: &Path, keystone_version: &str, max_entries: usize) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            keystone_version: keystone_version.to_string(),
            max_entries: max_entries.max(1),
        }
    }

    /// Returns the root cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the file a manifest key is stored in.
    pub fn manifest_path(&self, manifest_key: &RuleKey) -> PathBuf {
        self.cache_dir
            .join(MANIFEST_SUBDIR)
            .join(format!("{manifest_key}.json"))
    }

    /// Loads the manifest for a key, or an empty one.
    pub fn load(&self, manifest_key: &RuleKey) -> DepFileManifest {
        DepFileManifest::load(&self.manifest_path(manifest_key))
            .filter(|m| m.is_compatible(&self.keystone_version))
            .unwrap_or_else(|| DepFileManifest::new(&self.keystone_version))
    }

    /// Records a build's dependency-file key under its manifest key.
    ///
    /// The current hashes of the dependency-file key's inputs are stored with
    /// it so later lookups can tell whether the key is still valid.
    pub fn record(
        &self,
        manifest_key: &RuleKey,
        dep_file: &RuleKeyAndInputs,
        loader: &dyn FileHashLoader,
    ) -> Result<(), CacheError> {
        let entry = ManifestEntry::from_dep_file_key(dep_file, loader)?;
        let mut manifest = self.load(manifest_key);
        manifest.add_entry(entry, self.max_entries);
        manifest.save(&self.manifest_path(manifest_key))?;
        debug!(
            manifest_key = %manifest_key,
            dep_file_key = %dep_file.rule_key,
            records = manifest.entries.len(),
            "recorded dependency-file key"
        );
        Ok(())
    }

    /// Finds a previously recorded dependency-file key whose inputs are
    /// unchanged.
    ///
    /// `manifest` is the result of computing the rule's manifest key; its
    /// inputs bound which recorded inputs may match.
    pub fn lookup(
        &self,
        manifest: &RuleKeyAndInputs,
        loader: &dyn FileHashLoader,
    ) -> Result<Option<ManifestEntry>, CacheError> {
        let stored = self.load(&manifest.rule_key);
        let hit = stored.lookup(loader, &manifest.inputs)?.cloned();
        debug!(
            manifest_key = %manifest.rule_key,
            records = stored.entries.len(),
            hit = hit.is_some(),
            "manifest lookup"
        );
        Ok(hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_common::SourcePath;
    use keystone_rulekey::{DependencyEntry, MemoryHashLoader};
    use std::collections::BTreeSet;

    fn p(path: &str) -> SourcePath {
        SourcePath::path(path)
    }

    fn keyed(raw: u8, inputs: &[&str]) -> RuleKeyAndInputs {
        RuleKeyAndInputs {
            rule_key: RuleKey::from_raw([raw; 16]),
            inputs: inputs.iter().map(|s| p(s)).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn manifest_path_layout() {
        let store = ManifestStore::new(Path::new("/tmp/ks"), "0.1.0", 4);
        let key = RuleKey::from_raw([0xab; 16]);
        assert_eq!(
            store.manifest_path(&key),
            PathBuf::from(format!("/tmp/ks/manifests/{}.json", "ab".repeat(16)))
        );
    }

    #[test]
    fn record_then_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path(), "0.1.0", 4);
        let loader = MemoryHashLoader::new()
            .with_content(p("a.h"), b"a")
            .with_content(p("b.h"), b"b");
        let manifest = keyed(1, &["a.h", "b.h"]);

        store.record(&manifest.rule_key, &keyed(9, &["a.h"]), &loader).unwrap();
        let hit = store.lookup(&manifest, &loader).unwrap().unwrap();
        assert_eq!(hit.dep_file_key, RuleKey::from_raw([9; 16]));
        assert_eq!(hit.dep_file_entries(), vec![DependencyEntry::new("a.h")]);
    }

    #[test]
    fn lookup_misses_after_used_input_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path(), "0.1.0", 4);
        let manifest = keyed(1, &["a.h", "b.h"]);
        let before = MemoryHashLoader::new().with_content(p("a.h"), b"a");
        store.record(&manifest.rule_key, &keyed(9, &["a.h"]), &before).unwrap();

        let after = MemoryHashLoader::new()
            .with_content(p("a.h"), b"edited")
            .with_content(p("b.h"), b"b");
        assert!(store.lookup(&manifest, &after).unwrap().is_none());

        // Unused inputs may change freely.
        let unused = MemoryHashLoader::new()
            .with_content(p("a.h"), b"a")
            .with_content(p("b.h"), b"edited");
        assert!(store.lookup(&manifest, &unused).unwrap().is_some());
    }

    #[test]
    fn incompatible_version_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loader = MemoryHashLoader::new().with_content(p("a.h"), b"a");
        let manifest = keyed(1, &["a.h"]);
        ManifestStore::new(dir.path(), "0.1.0", 4)
            .record(&manifest.rule_key, &keyed(9, &["a.h"]), &loader)
            .unwrap();

        let newer = ManifestStore::new(dir.path(), "0.2.0", 4);
        assert!(newer.load(&manifest.rule_key).entries.is_empty());
        assert!(newer.lookup(&manifest, &loader).unwrap().is_none());
    }

    #[test]
    fn corrupt_manifest_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path(), "0.1.0", 4);
        let key = RuleKey::from_raw([3; 16]);
        let path = store.manifest_path(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ truncated").unwrap();
        assert!(store.load(&key).entries.is_empty());
    }

    #[test]
    fn record_respects_max_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path(), "0.1.0", 2);
        let loader = MemoryHashLoader::new().with_content(p("a.h"), b"a");
        let key = RuleKey::from_raw([1; 16]);
        for raw in 10..14 {
            store.record(&key, &keyed(raw, &["a.h"]), &loader).unwrap();
        }
        let kept: Vec<_> = store.load(&key).entries.iter().map(|e| e.dep_file_key).collect();
        assert_eq!(kept, vec![RuleKey::from_raw([12; 16]), RuleKey::from_raw([13; 16])]);
    }

    #[test]
    fn record_fails_when_input_cannot_be_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path(), "0.1.0", 4);
        let err = store
            .record(&RuleKey::from_raw([1; 16]), &keyed(9, &["missing.h"]), &MemoryHashLoader::new())
            .unwrap_err();
        assert!(matches!(err, CacheError::Hash(_)));
    }
}
