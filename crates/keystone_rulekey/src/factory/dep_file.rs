//! Dependency-file and manifest rule keys.

use std::collections::BTreeSet;
use std::sync::Arc;

use keystone_common::{BuildTarget, SourcePath};
use tracing::{debug, trace};

use crate::accumulator::{Accumulator, InputPolicy, InputSink};
use crate::dep_entry::DependencyEntry;
use crate::error::RuleKeyError;
use crate::loader::FileHashLoader;
use crate::rule::{RuleKeyFieldLoader, SupportsDependencyFileRuleKey};
use crate::rule_key::{KeyType, RuleKeyAndInputs};
use crate::value::RuleValue;

/// Field key under which the key type is folded.
pub const KEY_TYPE_FIELD: &str = "rulekey.key_type";

/// Computes dependency-file and manifest keys.
///
/// Stateless and reentrant: every call opens its own accumulator, so one
/// factory can key many rules concurrently. Results are not cached; callers
/// that need reuse cache [`RuleKeyAndInputs`] themselves.
#[derive(Clone)]
pub struct DependencyFileRuleKeyFactory {
    field_loader: RuleKeyFieldLoader,
    hash_loader: Arc<dyn FileHashLoader>,
}

impl DependencyFileRuleKeyFactory {
    /// Creates a factory.
    pub fn new(field_loader: RuleKeyFieldLoader, hash_loader: Arc<dyn FileHashLoader>) -> Self {
        Self {
            field_loader,
            hash_loader,
        }
    }

    /// Computes the dependency-file key of `rule`, narrowed to the inputs
    /// listed in `dep_file_entries`.
    ///
    /// Fails with [`RuleKeyError::StaleDepFile`] if any entry does not match a
    /// covered input of the rule.
    pub fn build<R>(
        &self,
        rule: &R,
        dep_file_entries: &[DependencyEntry],
    ) -> Result<RuleKeyAndInputs, RuleKeyError>
    where
        R: SupportsDependencyFileRuleKey + ?Sized,
    {
        let entries: BTreeSet<DependencyEntry> = dep_file_entries.iter().cloned().collect();
        self.build_key(rule, KeyType::DepFile, &entries)
    }

    /// Computes the manifest key of `rule`, returning every covered input.
    pub fn build_manifest_key<R>(&self, rule: &R) -> Result<RuleKeyAndInputs, RuleKeyError>
    where
        R: SupportsDependencyFileRuleKey + ?Sized,
    {
        self.build_key(rule, KeyType::Manifest, &BTreeSet::new())
    }

    fn build_key<R>(
        &self,
        rule: &R,
        key_type: KeyType,
        entries: &BTreeSet<DependencyEntry>,
    ) -> Result<RuleKeyAndInputs, RuleKeyError>
    where
        R: SupportsDependencyFileRuleKey + ?Sized,
    {
        let classifier = Classifier {
            rule,
            key_type,
            entries,
            inputs: BTreeSet::new(),
            accounted: BTreeSet::new(),
        };
        let mut acc = Accumulator::open(self.hash_loader.as_ref(), classifier);
        self.field_loader.set_fields(rule, &mut acc)?;
        acc.fold_field(KEY_TYPE_FIELD, &RuleValue::Str(key_type.as_str().to_string()))?;
        let (rule_key, classifier) = acc.close();

        if key_type == KeyType::DepFile {
            // An entry that matched nothing means the rule no longer consumes
            // that input, so the dependency file describes an older rule.
            let unaccounted: Vec<DependencyEntry> = entries
                .difference(&classifier.accounted)
                .cloned()
                .collect();
            if !unaccounted.is_empty() {
                debug!(
                    rule = %rule.build_target(),
                    unaccounted = unaccounted.len(),
                    "dependency file is stale"
                );
                return Err(RuleKeyError::StaleDepFile {
                    target: rule.build_target().clone(),
                    unaccounted,
                });
            }
        }

        debug!(
            rule = %rule.build_target(),
            %key_type,
            %rule_key,
            inputs = classifier.inputs.len(),
            "computed dependency-file rule key"
        );
        Ok(RuleKeyAndInputs {
            rule_key,
            inputs: classifier.inputs,
        })
    }
}

/// Classifies each source path of a rule against the dependency file.
struct Classifier<'r, R: ?Sized> {
    rule: &'r R,
    key_type: KeyType,
    entries: &'r BTreeSet<DependencyEntry>,
    inputs: BTreeSet<SourcePath>,
    accounted: BTreeSet<DependencyEntry>,
}

impl<R> InputPolicy for Classifier<'_, R>
where
    R: SupportsDependencyFileRuleKey + ?Sized,
{
    fn fold_source_path(
        &mut self,
        sink: &mut InputSink<'_>,
        path: &SourcePath,
    ) -> Result<(), RuleKeyError> {
        if !self.rule.covered_by_dep_file(path) {
            trace!(%path, "not covered by dependency file");
            return sink.fold_source_path(path, true);
        }
        match self.key_type {
            KeyType::DepFile => {
                let entry = DependencyEntry::from_source_path(path);
                if self.entries.contains(&entry) {
                    trace!(%path, "used according to dependency file");
                    sink.fold_source_path(path, true)?;
                    self.inputs.insert(path.clone());
                    self.accounted.insert(entry);
                } else if self.rule.existence_of_interest(path) {
                    trace!(%path, "unused, existence of interest");
                    sink.fold_source_path(path, false)?;
                } else {
                    // Unused and uninteresting: leaves no trace in the key.
                    trace!(%path, "unused, excluded");
                }
            }
            KeyType::Manifest => {
                // Manifest keys are built as if no covered input were used,
                // but report all of them.
                self.inputs.insert(path.clone());
                if self.rule.existence_of_interest(path) {
                    sink.fold_source_path(path, false)?;
                }
            }
        }
        Ok(())
    }

    fn fold_build_rule(
        &mut self,
        _sink: &mut InputSink<'_>,
        target: &BuildTarget,
    ) -> Result<(), RuleKeyError> {
        Err(RuleKeyError::BuildRuleInDepFileKey {
            target: self.rule.build_target().clone(),
            rule: target.clone(),
        })
    }

    fn expands_archive_members(&self) -> bool {
        true
    }
}
