//! Rule description files.
//!
//! A rule file declares one rule and its key fields:
//!
//! ```toml
//! [rule]
//! target = "//lib:foo"
//! type = "cxx_compile"
//! covered_extensions = ["h"]
//!
//! [[field]]
//! name = "srcs"
//! paths = ["lib/foo.cpp", "lib/foo.h"]
//! ```
//!
//! Fields keep their file order, which is the order they are folded in.
//! Source paths are written as `dir/file`, `//base:name[out/file]` for the
//! output of another rule, or `archive!member` for a file inside a zip.

use std::collections::BTreeSet;
use std::path::Path;

use keystone_common::source_path::is_repository_relative;
use keystone_common::{BuildTarget, SourcePath};
use keystone_rulekey::{
    ArchiveDependencies, RuleDescription, RuleField, RuleValue, SupportsDependencyFileRuleKey,
};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::loader::validate_extensions;
use crate::types::DepFileConfig;

#[derive(Debug, Deserialize)]
struct RuleFile {
    rule: RuleHeader,
    #[serde(default)]
    field: Vec<FieldSpec>,
}

#[derive(Debug, Deserialize)]
struct RuleHeader {
    target: String,
    #[serde(rename = "type")]
    rule_type: String,
    covered_extensions: Option<Vec<String>>,
    interest_extensions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct FieldSpec {
    name: String,
    #[serde(flatten)]
    value: FieldValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FieldValue {
    String(String),
    Int(i64),
    Bool(bool),
    Strings(Vec<String>),
    Path(String),
    Paths(Vec<String>),
    NonHashingPath(String),
    Rule(String),
    Archive(ArchiveSpec),
}

#[derive(Debug, Deserialize)]
struct ArchiveSpec {
    path: String,
    members: Vec<String>,
}

/// A rule loaded from a description file.
///
/// Coverage and interest are decided by file extension.
#[derive(Debug, Clone)]
pub struct DeclaredRule {
    target: BuildTarget,
    rule_type: String,
    fields: Vec<RuleField>,
    covered_extensions: BTreeSet<String>,
    interest_extensions: BTreeSet<String>,
}

impl DeclaredRule {
    /// Creates a rule directly.
    pub fn new(
        target: BuildTarget,
        rule_type: impl Into<String>,
        fields: Vec<RuleField>,
        policy: &DepFileConfig,
    ) -> Self {
        Self {
            target,
            rule_type: rule_type.into(),
            fields,
            covered_extensions: policy.covered_extensions.iter().cloned().collect(),
            interest_extensions: policy.interest_extensions.iter().cloned().collect(),
        }
    }
}

impl RuleDescription for DeclaredRule {
    fn build_target(&self) -> &BuildTarget {
        &self.target
    }

    fn rule_type(&self) -> &str {
        &self.rule_type
    }

    fn fields(&self) -> Vec<RuleField> {
        self.fields.clone()
    }
}

impl SupportsDependencyFileRuleKey for DeclaredRule {
    fn covered_by_dep_file(&self, path: &SourcePath) -> bool {
        path.extension()
            .is_some_and(|ext| self.covered_extensions.contains(ext))
    }

    fn existence_of_interest(&self, path: &SourcePath) -> bool {
        path.extension()
            .is_some_and(|ext| self.interest_extensions.contains(ext))
    }
}

/// Loads a rule file, using `defaults` where the file sets no extensions.
pub fn load_rule_file(path: &Path, defaults: &DepFileConfig) -> Result<DeclaredRule, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_rule_str(&content, defaults)
}

/// Parses and validates a rule file from a string.
pub fn parse_rule_str(content: &str, defaults: &DepFileConfig) -> Result<DeclaredRule, ConfigError> {
    let file: RuleFile =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    let header = file.rule;

    let target: BuildTarget = header.target.parse()?;
    if header.rule_type.is_empty() {
        return Err(ConfigError::MissingField("rule.type".to_string()));
    }

    let policy = DepFileConfig {
        covered_extensions: header
            .covered_extensions
            .unwrap_or_else(|| defaults.covered_extensions.clone()),
        interest_extensions: header
            .interest_extensions
            .unwrap_or_else(|| defaults.interest_extensions.clone()),
    };
    validate_extensions("rule.covered_extensions", &policy.covered_extensions)?;
    validate_extensions("rule.interest_extensions", &policy.interest_extensions)?;

    let mut seen = BTreeSet::new();
    let mut fields = Vec::with_capacity(file.field.len());
    for spec in file.field {
        if spec.name.is_empty() {
            return Err(ConfigError::MissingField("field.name".to_string()));
        }
        if !seen.insert(spec.name.clone()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate field '{}'",
                spec.name
            )));
        }
        fields.push(RuleField::new(spec.name, to_rule_value(spec.value)?));
    }

    Ok(DeclaredRule::new(target, header.rule_type, fields, &policy))
}

fn to_rule_value(value: FieldValue) -> Result<RuleValue, ConfigError> {
    Ok(match value {
        FieldValue::String(s) => RuleValue::Str(s),
        FieldValue::Int(i) => RuleValue::Int(i),
        FieldValue::Bool(b) => RuleValue::Bool(b),
        FieldValue::Strings(v) => RuleValue::strings(v),
        FieldValue::Path(p) => RuleValue::SourcePath(parse_source_path(&p)?),
        FieldValue::Paths(v) => RuleValue::paths(
            v.iter()
                .map(|p| parse_source_path(p))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        FieldValue::NonHashingPath(p) => RuleValue::NonHashingPath(parse_source_path(&p)?),
        FieldValue::Rule(t) => RuleValue::BuildRule(t.parse()?),
        FieldValue::Archive(spec) => {
            let archive = parse_source_path(&spec.path)?;
            if archive.archive_member_path().is_some() {
                return Err(ConfigError::ValidationError(format!(
                    "nested archive '{}' is not supported",
                    spec.path
                )));
            }
            let members = spec
                .members
                .iter()
                .map(|m| SourcePath::archive_member(archive.clone(), m))
                .collect();
            RuleValue::Archives(ArchiveDependencies {
                archives: vec![archive],
                members,
            })
        }
    })
}

/// Parses the textual form of a source path.
pub fn parse_source_path(s: &str) -> Result<SourcePath, ConfigError> {
    if let Some((archive, member)) = s.split_once('!') {
        if member.is_empty() || archive.contains('!') || member.contains('!') {
            return Err(ConfigError::ValidationError(format!(
                "invalid archive member '{s}'"
            )));
        }
        return Ok(SourcePath::archive_member(parse_file_path(archive)?, member));
    }
    parse_file_path(s)
}

fn parse_file_path(s: &str) -> Result<SourcePath, ConfigError> {
    if s.is_empty() {
        return Err(ConfigError::ValidationError("empty source path".to_string()));
    }
    if !s.starts_with("//") {
        return Ok(SourcePath::path(repository_path(s, s)?));
    }
    let (target, path) = s
        .strip_suffix(']')
        .and_then(|rest| rest.split_once('['))
        .ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "rule output '{s}' must be written as //base:name[path]"
            ))
        })?;
    Ok(SourcePath::output(target.parse()?, repository_path(path, s)?))
}

/// Checks that `path` names a file inside the repository.
fn repository_path<'a>(path: &'a str, written: &str) -> Result<&'a Path, ConfigError> {
    let path = Path::new(path);
    if !is_repository_relative(path) {
        return Err(ConfigError::ValidationError(format!(
            "source path '{written}' must be relative to the repository root"
        )));
    }
    Ok(path)
}
