//! `keystone key`, `keystone dep-file-key` and `keystone manifest-key`.

use std::path::{Path, PathBuf};

use keystone_cache::load_dep_file;
use keystone_config::DeclaredRule;
use keystone_rulekey::{KeyType, RuleDescription, RuleKeyAndInputs, RuleKeyError};
use rayon::prelude::*;
use serde_json::json;

use crate::project::Project;
use crate::{DepFileArgs, GlobalArgs, OutputFormat, EXIT_STALE};

/// Runs `keystone key`: default keys for every rule, computed in parallel.
pub fn run_key(rules: &[PathBuf], global: &GlobalArgs) -> anyhow::Result<i32> {
    let project = Project::open(global)?;
    let loaded = rules
        .iter()
        .map(|path| project.load_rule(path))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let factory = project.default_factory();
    let keys = loaded
        .par_iter()
        .map(|rule| factory.build(rule))
        .collect::<Result<Vec<_>, _>>()?;

    match global.format {
        OutputFormat::Text => {
            for (rule, key) in loaded.iter().zip(&keys) {
                println!("{key}  {}", rule.build_target());
            }
        }
        OutputFormat::Json => {
            let report: Vec<_> = loaded
                .iter()
                .zip(&keys)
                .map(|(rule, key)| {
                    json!({
                        "target": rule.build_target().to_string(),
                        "key": key.to_string(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(0)
}

/// Runs `keystone dep-file-key`.
///
/// Exits with [`EXIT_STALE`] when the dependency file names inputs the rule
/// no longer has.
pub fn run_dep_file_key(args: &DepFileArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    let project = Project::open(global)?;
    let rule = project.load_rule(&args.rule)?;
    let entries = load_dep_file(&args.deps)?;

    match project.dep_file_factory().build(&rule, &entries) {
        Ok(result) => {
            print_keyed(&rule, KeyType::DepFile, &result, global)?;
            Ok(0)
        }
        Err(e) if e.is_stale() => {
            report_stale(&e, global)?;
            Ok(EXIT_STALE)
        }
        Err(e) => Err(e.into()),
    }
}

/// Runs `keystone manifest-key`.
pub fn run_manifest_key(rule: &Path, global: &GlobalArgs) -> anyhow::Result<i32> {
    let project = Project::open(global)?;
    let rule = project.load_rule(rule)?;
    let result = project.dep_file_factory().build_manifest_key(&rule)?;
    print_keyed(&rule, KeyType::Manifest, &result, global)?;
    Ok(0)
}

/// Prints a key together with the inputs it covers.
fn print_keyed(
    rule: &DeclaredRule,
    key_type: KeyType,
    result: &RuleKeyAndInputs,
    global: &GlobalArgs,
) -> anyhow::Result<()> {
    match global.format {
        OutputFormat::Text => {
            println!("{}  {}", result.rule_key, rule.build_target());
            if !global.quiet {
                for input in &result.inputs {
                    println!("    {input}");
                }
            }
        }
        OutputFormat::Json => {
            let report = json!({
                "target": rule.build_target().to_string(),
                "key_type": key_type.as_str(),
                "key": result.rule_key.to_string(),
                "inputs": result.inputs.iter().map(ToString::to_string).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

/// Reports a stale dependency file.
pub(crate) fn report_stale(err: &RuleKeyError, global: &GlobalArgs) -> anyhow::Result<()> {
    match (global.format, err) {
        (OutputFormat::Json, RuleKeyError::StaleDepFile { target, unaccounted }) => {
            let report = json!({
                "target": target.to_string(),
                "stale": true,
                "unaccounted": unaccounted.iter().map(ToString::to_string).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => eprintln!("stale dependency file: {err}"),
    }
    Ok(())
}
