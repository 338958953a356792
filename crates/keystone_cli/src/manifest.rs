//! `keystone record` and `keystone lookup`.

use std::path::Path;

use anyhow::Context;
use keystone_cache::load_dep_file;
use keystone_rulekey::RuleDescription;
use serde_json::json;
use tracing::info;

use crate::keys::report_stale;
use crate::project::Project;
use crate::{DepFileArgs, GlobalArgs, OutputFormat, EXIT_STALE};

/// Runs `keystone record`: computes the dependency-file key from the given
/// dependency file and stores it under the rule's manifest key.
pub fn run_record(args: &DepFileArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    let project = Project::open(global)?;
    let rule = project.load_rule(&args.rule)?;
    let entries = load_dep_file(&args.deps)?;
    let factory = project.dep_file_factory();

    let manifest = factory.build_manifest_key(&rule)?;
    let dep_file = match factory.build(&rule, &entries) {
        Ok(result) => result,
        Err(e) if e.is_stale() => {
            report_stale(&e, global)?;
            return Ok(EXIT_STALE);
        }
        Err(e) => return Err(e.into()),
    };

    project
        .store()
        .record(&manifest.rule_key, &dep_file, project.hash_loader())
        .with_context(|| format!("failed to record {}", rule.build_target()))?;
    info!(target_rule = %rule.build_target(), "recorded dependency-file key");

    match global.format {
        OutputFormat::Text => {
            if !global.quiet {
                println!(
                    "recorded {} under manifest {}  {}",
                    dep_file.rule_key,
                    manifest.rule_key,
                    rule.build_target()
                );
            }
        }
        OutputFormat::Json => {
            let report = json!({
                "target": rule.build_target().to_string(),
                "manifest_key": manifest.rule_key.to_string(),
                "dep_file_key": dep_file.rule_key.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(0)
}

/// Runs `keystone lookup`: finds a recorded dependency-file key whose used
/// inputs are unchanged.
pub fn run_lookup(rule: &Path, global: &GlobalArgs) -> anyhow::Result<i32> {
    let project = Project::open(global)?;
    let rule = project.load_rule(rule)?;
    let manifest = project.dep_file_factory().build_manifest_key(&rule)?;
    let hit = project.store().lookup(&manifest, project.hash_loader())?;

    match global.format {
        OutputFormat::Text => match hit {
            Some(ref entry) => {
                println!("{}  {}", entry.dep_file_key, rule.build_target());
                if !global.quiet {
                    for entry in entry.dep_file_entries() {
                        println!("    {entry}");
                    }
                }
            }
            None if !global.quiet => {
                eprintln!("no recorded dependency-file key matches {}", rule.build_target());
            }
            None => {}
        },
        OutputFormat::Json => {
            let report = json!({
                "target": rule.build_target().to_string(),
                "manifest_key": manifest.rule_key.to_string(),
                "dep_file_key": hit.as_ref().map(|e| e.dep_file_key.to_string()),
                "dep_file": hit.as_ref().map(|e| {
                    e.dep_file_entries()
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                }),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::tests_support::{fixture, global};
    use keystone_cache::ManifestStore;
    use keystone_rulekey::{DependencyEntry, FsHashLoader};

    fn record_args(root: &Path, deps: &str) -> DepFileArgs {
        let args = DepFileArgs {
            rule: root.join("rules").join("foo.toml"),
            deps: root.join("foo.deps"),
        };
        std::fs::write(&args.deps, deps).unwrap();
        args
    }

    fn lookup(root: &Path) -> Option<Vec<DependencyEntry>> {
        let g = global(root);
        let project = Project::open(&g).unwrap();
        let rule = project.load_rule(&root.join("rules").join("foo.toml")).unwrap();
        let manifest = project.dep_file_factory().build_manifest_key(&rule).unwrap();
        let store = ManifestStore::new(&root.join(".keystone"), env!("CARGO_PKG_VERSION"), 16);
        store
            .lookup(&manifest, &FsHashLoader::new(root))
            .unwrap()
            .map(|e| e.dep_file_entries())
    }

    #[test]
    fn record_then_lookup() {
        let tmp = fixture();
        let args = record_args(tmp.path(), "lib/a.h\n");
        assert_eq!(run_record(&args, &global(tmp.path())).unwrap(), 0);
        assert!(tmp.path().join(".keystone").join("manifests").is_dir());

        assert_eq!(run_lookup(&args.rule, &global(tmp.path())).unwrap(), 0);
        assert_eq!(lookup(tmp.path()), Some(vec![DependencyEntry::new("lib/a.h")]));
    }

    #[test]
    fn lookup_ignores_unused_header_edits() {
        let tmp = fixture();
        let args = record_args(tmp.path(), "lib/a.h\n");
        run_record(&args, &global(tmp.path())).unwrap();

        std::fs::write(tmp.path().join("lib").join("b.h"), "int b2;\n").unwrap();
        assert!(lookup(tmp.path()).is_some());

        std::fs::write(tmp.path().join("lib").join("a.h"), "int a2;\n").unwrap();
        assert!(lookup(tmp.path()).is_none());
    }

    #[test]
    fn record_stale_dep_file() {
        let tmp = fixture();
        let args = record_args(tmp.path(), "lib/gone.h\n");
        assert_eq!(run_record(&args, &global(tmp.path())).unwrap(), EXIT_STALE);
        assert!(!tmp.path().join(".keystone").exists());
    }

    #[test]
    fn lookup_without_records() {
        let tmp = fixture();
        let rule = tmp.path().join("rules").join("foo.toml");
        assert_eq!(run_lookup(&rule, &global(tmp.path())).unwrap(), 0);
        assert!(lookup(tmp.path()).is_none());
    }
}
