//! Plain input-based rule keys.

use std::sync::Arc;

use keystone_common::{BuildTarget, SourcePath};
use tracing::debug;

use crate::accumulator::{Accumulator, InputPolicy, InputSink};
use crate::error::RuleKeyError;
use crate::loader::FileHashLoader;
use crate::rule::{RuleDescription, RuleKeyFieldLoader};
use crate::rule_key::RuleKey;

/// Computes keys that hash every declared input.
///
/// Build rule references are folded as the referenced target's identity,
/// and archive dependencies as the archives themselves.
#[derive(Clone)]
pub struct DefaultRuleKeyFactory {
    field_loader: RuleKeyFieldLoader,
    hash_loader: Arc<dyn FileHashLoader>,
}

impl DefaultRuleKeyFactory {
    /// Creates a factory.
    pub fn new(field_loader: RuleKeyFieldLoader, hash_loader: Arc<dyn FileHashLoader>) -> Self {
        Self {
            field_loader,
            hash_loader,
        }
    }

    /// Computes the key of `rule`.
    pub fn build<R>(&self, rule: &R) -> Result<RuleKey, RuleKeyError>
    where
        R: RuleDescription + ?Sized,
    {
        let mut acc = Accumulator::open(self.hash_loader.as_ref(), AllInputs);
        self.field_loader.set_fields(rule, &mut acc)?;
        let (rule_key, _) = acc.close();
        debug!(rule = %rule.build_target(), %rule_key, "computed rule key");
        Ok(rule_key)
    }
}

struct AllInputs;

impl InputPolicy for AllInputs {
    fn fold_source_path(
        &mut self,
        sink: &mut InputSink<'_>,
        path: &SourcePath,
    ) -> Result<(), RuleKeyError> {
        sink.fold_source_path(path, true)
    }

    fn fold_build_rule(
        &mut self,
        sink: &mut InputSink<'_>,
        target: &BuildTarget,
    ) -> Result<(), RuleKeyError> {
        sink.fold_build_target(target);
        Ok(())
    }
}
