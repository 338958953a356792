//! Error types for rule key computation.

use keystone_common::BuildTarget;

use crate::dep_entry::DependencyEntry;
use crate::loader::HashError;

/// Errors that can occur while computing a rule key.
///
/// Each error is local to the rule being keyed; concurrent computations for
/// other rules are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum RuleKeyError {
    /// Entries of the dependency file did not match any covered input of the
    /// rule. The rule's inputs changed shape since the dependency file was
    /// recorded, so the dependency-file key cannot be used; callers fall back
    /// to a full rebuild.
    #[error(
        "{target}: could not find any inputs matching the relative paths [{}]",
        join_entries(.unaccounted)
    )]
    StaleDepFile {
        /// The rule being keyed.
        target: BuildTarget,
        /// Entries with no matching covered input, in sorted order.
        unaccounted: Vec<DependencyEntry>,
    },

    /// A build rule reference appeared where dependency-file keying only
    /// permits source paths. The rule's description must be fixed; retrying
    /// cannot help.
    #[error(
        "dependency-file rule key builders cannot process build rules: \
         {target} referenced {rule}"
    )]
    BuildRuleInDepFileKey {
        /// The rule being keyed.
        target: BuildTarget,
        /// The referenced build rule.
        rule: BuildTarget,
    },

    /// The content hash loader failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl RuleKeyError {
    /// Returns `true` for the stale dependency file condition.
    pub fn is_stale(&self) -> bool {
        matches!(self, RuleKeyError::StaleDepFile { .. })
    }

    /// Returns `true` when the rule description violates the dependency-file
    /// contract.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, RuleKeyError::BuildRuleInDepFileKey { .. })
    }
}

fn join_entries(entries: &[DependencyEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
