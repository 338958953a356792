//! Project discovery and the services commands share.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use keystone_cache::ManifestStore;
use keystone_config::{load_config, DeclaredRule, ProjectConfig, CONFIG_FILE};
use keystone_rulekey::{
    DefaultRuleKeyFactory, DependencyFileRuleKeyFactory, FileHashLoader, FsHashLoader,
    RuleKeyFieldLoader,
};
use tracing::debug;

use crate::GlobalArgs;

/// Version recorded in manifests; a different version starts them afresh.
const KEYSTONE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A loaded project: configuration, input hashing and manifest storage.
pub struct Project {
    /// Parsed `keystone.toml`.
    pub config: ProjectConfig,
    hash_loader: Arc<dyn FileHashLoader>,
    store: ManifestStore,
}

impl Project {
    /// Opens the project selected by `--project`, or the nearest one above
    /// the current directory.
    pub fn open(global: &GlobalArgs) -> anyhow::Result<Self> {
        let root = match global.project {
            Some(ref dir) => dir.clone(),
            None => find_project_root(&std::env::current_dir()?)?,
        };
        let config = load_config(&root)
            .with_context(|| format!("failed to load {}", root.join(CONFIG_FILE).display()))?;
        let store = ManifestStore::new(
            &root.join(&config.cache.dir),
            KEYSTONE_VERSION,
            config.cache.max_manifest_entries,
        );
        debug!(root = %root.display(), project = %config.project.name, "opened project");
        Ok(Self {
            hash_loader: Arc::new(FsHashLoader::new(root)),
            config,
            store,
        })
    }

    /// Loads a rule description file.
    pub fn load_rule(&self, path: &Path) -> anyhow::Result<DeclaredRule> {
        keystone_config::load_rule_file(path, &self.config.dep_file)
            .with_context(|| format!("failed to load rule file {}", path.display()))
    }

    /// The loader hashing inputs under the project root.
    pub fn hash_loader(&self) -> &dyn FileHashLoader {
        self.hash_loader.as_ref()
    }

    /// The project's manifest store.
    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// A factory for plain input-based keys.
    pub fn default_factory(&self) -> DefaultRuleKeyFactory {
        DefaultRuleKeyFactory::new(self.field_loader(), Arc::clone(&self.hash_loader))
    }

    /// A factory for dependency-file and manifest keys.
    pub fn dep_file_factory(&self) -> DependencyFileRuleKeyFactory {
        DependencyFileRuleKeyFactory::new(self.field_loader(), Arc::clone(&self.hash_loader))
    }

    fn field_loader(&self) -> RuleKeyFieldLoader {
        RuleKeyFieldLoader::new(self.config.rulekey.seed)
    }
}

/// Walks up from `start` looking for the nearest directory containing
/// `keystone.toml`.
pub fn find_project_root(start: &Path) -> anyhow::Result<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            bail!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            );
        }
    }
}


#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::OutputFormat;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) const RULE: &str = r#"
[rule]
target = "//lib:foo"
type = "cxx_compile"

[[field]]
name = "flags"
strings = ["-O2"]

[[field]]
name = "srcs"
paths = ["lib/foo.cpp", "lib/a.h", "lib/b.h"]
"#;

    /// A project with one C++ compile rule whose headers are covered.
    pub(crate) fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(
            root.join(CONFIG_FILE),
            "[project]\nname = \"demo\"\n[dep_file]\ncovered_extensions = [\"h\"]\n",
        )
        .unwrap();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::create_dir_all(root.join("rules")).unwrap();
        fs::write(root.join("lib").join("foo.cpp"), "#include \"a.h\"\n").unwrap();
        fs::write(root.join("lib").join("a.h"), "int a;\n").unwrap();
        fs::write(root.join("lib").join("b.h"), "int b;\n").unwrap();
        fs::write(root.join("rules").join("foo.toml"), RULE).unwrap();
        tmp
    }

    pub(crate) fn global(project: &Path) -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
            project: Some(project.to_path_buf()),
            format: OutputFormat::Text,
        }
    }
}
