//! How rules describe themselves to the key factories.

use keystone_common::{BuildTarget, SourcePath};

use crate::accumulator::{Accumulator, InputPolicy};
use crate::error::RuleKeyError;
use crate::value::{RuleField, RuleValue};

/// A build rule that can be keyed.
pub trait RuleDescription: Send + Sync {
    /// The rule's target.
    fn build_target(&self) -> &BuildTarget;

    /// The rule type name, e.g. `cxx_compile`.
    fn rule_type(&self) -> &str;

    /// The rule's key fields in their declared order.
    ///
    /// The order must not depend on anything transient (such as hash set
    /// iteration order), since keys are compared across machines.
    fn fields(&self) -> Vec<RuleField>;
}

/// A rule whose key can be narrowed by a dependency file.
///
/// Such rules must be described purely in terms of source paths: a build
/// rule reference in their fields is a contract violation.
pub trait SupportsDependencyFileRuleKey: RuleDescription {
    /// Whether `path` is eligible for narrowing at all.
    fn covered_by_dep_file(&self, path: &SourcePath) -> bool;

    /// Whether a covered input's existence must affect the key even when the
    /// dependency file does not list it.
    fn existence_of_interest(&self, path: &SourcePath) -> bool;
}

/// Field key for the configured seed.
pub const SEED_FIELD: &str = "rulekey.seed";
/// Field key for the rule's fully qualified name.
pub const NAME_FIELD: &str = "name";
/// Field key for the rule type.
pub const TYPE_FIELD: &str = "rulekey.type";

/// Walks a rule's description into an accumulator.
///
/// Folds the seed, the rule's name and type, then every declared field in
/// order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleKeyFieldLoader {
    seed: i64,
}

impl RuleKeyFieldLoader {
    /// Creates a loader folding `seed` into every key.
    pub fn new(seed: i64) -> Self {
        Self { seed }
    }

    /// The configured seed.
    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// Folds `rule`'s identity and fields.
    pub fn set_fields<R, P>(
        &self,
        rule: &R,
        acc: &mut Accumulator<'_, P>,
    ) -> Result<(), RuleKeyError>
    where
        R: RuleDescription + ?Sized,
        P: InputPolicy,
    {
        acc.fold_field(SEED_FIELD, &RuleValue::Int(self.seed))?;
        acc.fold_field(
            NAME_FIELD,
            &RuleValue::Str(rule.build_target().fully_qualified_name()),
        )?;
        acc.fold_rule_type(TYPE_FIELD, rule.rule_type());
        for field in rule.fields() {
            acc.fold_field(&field.name, &field.value)?;
        }
        Ok(())
    }
}
