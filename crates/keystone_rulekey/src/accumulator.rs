//! The rule key accumulator: one hashing session per key computation.
//!
//! An [`Accumulator`] walks [`RuleValue`]s, bracketing composite values in
//! scopes. Source paths and build rule references are handed to the
//! session's [`InputPolicy`], which decides how (and whether) they are folded
//! by calling back into the [`InputSink`].

use keystone_common::source_path::path_key;
use keystone_common::{BuildTarget, SourcePath};

use crate::error::RuleKeyError;
use crate::hasher::{Container, FoldEvent, KeyHasher, ScopeTag, Wrapper};
use crate::loader::FileHashLoader;
use crate::rule_key::RuleKey;
use crate::value::{ArchiveDependencies, RuleField, RuleValue};

/// The hashing half of a session: the hash stream and the content hash
/// loader.
pub struct InputSink<'a> {
    hasher: KeyHasher,
    loader: &'a dyn FileHashLoader,
}

impl InputSink<'_> {
    /// Folds a source path.
    ///
    /// With `hashed` the path's identity and its content hash are folded.
    /// Without it only the identity is, so the path's existence affects the
    /// key but its content does not.
    pub fn fold_source_path(
        &mut self,
        path: &SourcePath,
        hashed: bool,
    ) -> Result<(), RuleKeyError> {
        if !hashed {
            self.hasher.fold(FoldEvent::NonHashingPath(&path.to_string()));
            return Ok(());
        }
        let hash = self.loader.hash(path)?;
        match path {
            SourcePath::Path(relative) => {
                self.hasher.fold(FoldEvent::Path(&path_key(relative), hash));
            }
            SourcePath::BuildTargetOutput { target, path } => {
                self.hasher.fold(FoldEvent::TargetPath(
                    &target.to_string(),
                    &path_key(path),
                    hash,
                ));
            }
            SourcePath::ArchiveMember { archive, member } => {
                self.hasher.fold(FoldEvent::ArchiveMember(
                    &archive.to_string(),
                    &path_key(member),
                    hash,
                ));
            }
        }
        Ok(())
    }

    /// Folds a build rule reference as its target identity.
    pub fn fold_build_target(&mut self, target: &BuildTarget) {
        self.hasher.push_scope(ScopeTag::Wrapper(Wrapper::BuildRule));
        self.hasher.fold(FoldEvent::BuildTarget(&target.to_string()));
        self.hasher.pop_scope();
    }
}

/// Decides how inputs are folded during one key computation.
pub trait InputPolicy {
    /// Handles a source path encountered in the rule's fields.
    fn fold_source_path(
        &mut self,
        sink: &mut InputSink<'_>,
        path: &SourcePath,
    ) -> Result<(), RuleKeyError>;

    /// Handles a build rule reference encountered in the rule's fields.
    fn fold_build_rule(
        &mut self,
        sink: &mut InputSink<'_>,
        target: &BuildTarget,
    ) -> Result<(), RuleKeyError>;

    /// Whether archive dependencies are folded member by member.
    fn expands_archive_members(&self) -> bool {
        false
    }
}

/// One rule key computation.
///
/// Owns the scope stack and running digest; never persisted, and consumed by
/// [`Accumulator::close`].
pub struct Accumulator<'a, P> {
    sink: InputSink<'a>,
    policy: P,
}

impl<'a, P: InputPolicy> Accumulator<'a, P> {
    /// Opens a session.
    pub fn open(loader: &'a dyn FileHashLoader, policy: P) -> Self {
        Self {
            sink: InputSink {
                hasher: KeyHasher::new(),
                loader,
            },
            policy,
        }
    }

    /// Runs `body` inside a scope, closing the scope even if `body` fails.
    fn scoped<F>(&mut self, tag: ScopeTag, body: F) -> Result<(), RuleKeyError>
    where
        F: FnOnce(&mut Self) -> Result<(), RuleKeyError>,
    {
        self.sink.hasher.push_scope(tag);
        let result = body(self);
        self.sink.hasher.pop_scope();
        result
    }

    /// Folds a named field.
    pub fn fold_field(&mut self, name: &str, value: &RuleValue) -> Result<(), RuleKeyError> {
        self.scoped(ScopeTag::Key(name.to_string()), |acc| acc.fold_value(value))
    }

    /// Folds the rule type under `key`.
    pub fn fold_rule_type(&mut self, key: &str, rule_type: &str) {
        self.sink.hasher.push_scope(ScopeTag::Key(key.to_string()));
        self.sink.hasher.fold(FoldEvent::RuleType(rule_type));
        self.sink.hasher.pop_scope();
    }

    /// Folds a value, dispatching on its kind.
    pub fn fold_value(&mut self, value: &RuleValue) -> Result<(), RuleKeyError> {
        match value {
            RuleValue::Null => self.sink.hasher.fold(FoldEvent::Null),
            RuleValue::Bool(b) => self.sink.hasher.fold(FoldEvent::Bool(*b)),
            RuleValue::Int(i) => self.sink.hasher.fold(FoldEvent::Int(*i)),
            RuleValue::Str(s) => self.sink.hasher.fold(FoldEvent::Str(s)),
            RuleValue::Bytes(b) => self.sink.hasher.fold(FoldEvent::Bytes(b)),
            RuleValue::SourcePath(path) => {
                return self.policy.fold_source_path(&mut self.sink, path);
            }
            RuleValue::NonHashingPath(path) => return self.sink.fold_source_path(path, false),
            RuleValue::BuildRule(target) => {
                return self.policy.fold_build_rule(&mut self.sink, target);
            }
            RuleValue::List(items) => return self.fold_list(items),
            RuleValue::Map(entries) => {
                return self.scoped(ScopeTag::Container(Container::Map), |acc| {
                    for (key, value) in entries {
                        acc.scoped(ScopeTag::Element, |acc| {
                            acc.sink.hasher.fold(FoldEvent::Str(key));
                            acc.fold_value(value)
                        })?;
                    }
                    Ok(())
                });
            }
            RuleValue::Optional(inner) => {
                return self.scoped(ScopeTag::Wrapper(Wrapper::Optional), |acc| match inner {
                    Some(value) => acc.fold_value(value),
                    None => {
                        acc.sink.hasher.fold(FoldEvent::Null);
                        Ok(())
                    }
                });
            }
            RuleValue::Appendable(fields) => return self.fold_appendable_scope(fields),
            RuleValue::Archives(archives) => return self.fold_archives(archives),
        }
        Ok(())
    }

    fn fold_list(&mut self, items: &[RuleValue]) -> Result<(), RuleKeyError> {
        self.scoped(ScopeTag::Container(Container::List), |acc| {
            for item in items {
                acc.scoped(ScopeTag::Element, |acc| acc.fold_value(item))?;
            }
            Ok(())
        })
    }

    fn fold_archives(&mut self, archives: &ArchiveDependencies) -> Result<(), RuleKeyError> {
        let paths = if self.policy.expands_archive_members() {
            &archives.members
        } else {
            &archives.archives
        };
        self.scoped(ScopeTag::Wrapper(Wrapper::Archives), |acc| {
            acc.scoped(ScopeTag::Container(Container::List), |acc| {
                for path in paths {
                    acc.scoped(ScopeTag::Element, |acc| {
                        acc.policy.fold_source_path(&mut acc.sink, path)
                    })?;
                }
                Ok(())
            })
        })
    }

    /// Folds a source path directly, bypassing the policy.
    pub fn fold_source_path(
        &mut self,
        path: &SourcePath,
        hashed: bool,
    ) -> Result<(), RuleKeyError> {
        self.sink.fold_source_path(path, hashed)
    }

    /// Folds a nested object's fields under an appendable wrapper.
    ///
    /// The fields are hashed in place rather than into a separate sub-key,
    /// because how their source paths are folded depends on the rule that
    /// references the object.
    pub fn fold_appendable_scope(&mut self, fields: &[RuleField]) -> Result<(), RuleKeyError> {
        self.scoped(ScopeTag::Wrapper(Wrapper::Appendable), |acc| {
            for field in fields {
                acc.fold_field(&field.name, &field.value)?;
            }
            Ok(())
        })
    }

    /// Finishes the session, returning the key and the policy's bookkeeping.
    pub fn close(self) -> (RuleKey, P) {
        (self.sink.hasher.finish(), self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryHashLoader;
    use std::collections::BTreeMap;

    /// Folds every path hashed and records what it saw.
    #[derive(Default)]
    struct Recording {
        paths: Vec<SourcePath>,
    }

    impl InputPolicy for Recording {
        fn fold_source_path(
            &mut self,
            sink: &mut InputSink<'_>,
            path: &SourcePath,
        ) -> Result<(), RuleKeyError> {
            self.paths.push(path.clone());
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

    fn loader() -> MemoryHashLoader {
        MemoryHashLoader::new()
            .with_content(SourcePath::path("a.c"), b"a")
            .with_content(SourcePath::path("b.c"), b"b")
    }

    fn key(loader: &MemoryHashLoader, fields: &[RuleField]) -> RuleKey {
        let mut acc = Accumulator::open(loader, Recording::default());
        for field in fields {
            acc.fold_field(&field.name, &field.value).unwrap();
        }
        acc.close().0
    }

    #[test]
    fn same_fields_same_key() {
        let loader = loader();
        let fields = [RuleField::new("srcs", RuleValue::paths([SourcePath::path("a.c")]))];
        assert_eq!(key(&loader, &fields), key(&loader, &fields));
    }

    #[test]
    fn field_order_matters() {
        let loader = loader();
        let a = RuleField::new("a", 1);
        let b = RuleField::new("b", 2);
        assert_ne!(
            key(&loader, &[a.clone(), b.clone()]),
            key(&loader, &[b, a])
        );
    }

    #[test]
    fn field_names_matter() {
        let loader = loader();
        assert_ne!(
            key(&loader, &[RuleField::new("a", 1)]),
            key(&loader, &[RuleField::new("b", 1)])
        );
    }

    #[test]
    fn nesting_is_not_flattened() {
        let loader = loader();
        let flat = [RuleField::new("x", 1), RuleField::new("y", 2)];
        let nested = [RuleField::new(
            "x",
            RuleValue::Appendable(vec![RuleField::new("y", 2)]),
        )];
        let listed = [RuleField::new(
            "x",
            RuleValue::List(vec![RuleValue::Int(1), RuleValue::Int(2)]),
        )];
        let k1 = key(&loader, &flat);
        let k2 = key(&loader, &nested);
        let k3 = key(&loader, &listed);
        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
        assert_ne!(k2, k3);
    }

    #[test]
    fn appendable_boundaries_are_folded() {
        let loader = loader();
        let sibling = [
            RuleField::new("p", 1),
            RuleField::new("q", RuleValue::Appendable(vec![RuleField::new("r", 2)])),
        ];
        let nested = [RuleField::new(
            "q",
            RuleValue::Appendable(vec![RuleField::new("p", 1), RuleField::new("r", 2)]),
        )];
        assert_ne!(key(&loader, &sibling), key(&loader, &nested));
    }

    #[test]
    fn optional_none_differs_from_absent() {
        let loader = loader();
        assert_ne!(
            key(&loader, &[RuleField::new("opt", RuleValue::optional(None))]),
            key(&loader, &[])
        );
    }

    #[test]
    fn map_keys_participate() {
        let loader = loader();
        let map = |k: &str| {
            let mut m = BTreeMap::new();
            m.insert(k.to_string(), RuleValue::Int(1));
            RuleField::new("env", RuleValue::Map(m))
        };
        assert_ne!(key(&loader, &[map("A")]), key(&loader, &[map("B")]));
    }

    #[test]
    fn policy_sees_nested_paths() {
        let loader = loader();
        let mut acc = Accumulator::open(&loader, Recording::default());
        let value = RuleValue::Appendable(vec![RuleField::new(
            "inner",
            RuleValue::optional(Some(RuleValue::paths([
                SourcePath::path("a.c"),
                SourcePath::path("b.c"),
            ]))),
        )]);
        acc.fold_field("outer", &value).unwrap();
        let (_, policy) = acc.close();
        assert_eq!(
            policy.paths,
            vec![SourcePath::path("a.c"), SourcePath::path("b.c")]
        );
    }

    #[test]
    fn non_hashing_path_ignores_content() {
        let loader = loader();
        let changed = MemoryHashLoader::new();
        let fields = [RuleField::new(
            "tool",
            RuleValue::NonHashingPath(SourcePath::path("a.c")),
        )];
        assert_eq!(key(&loader, &fields), key(&changed, &fields));
    }

    #[test]
    fn hash_failure_propagates_and_keeps_scopes_balanced() {
        let loader = MemoryHashLoader::new();
        let mut acc = Accumulator::open(&loader, Recording::default());
        let err = acc
            .fold_field("srcs", &RuleValue::paths([SourcePath::path("missing.c")]))
            .unwrap_err();
        assert!(matches!(err, RuleKeyError::Hash(_)));
        assert_eq!(acc.sink.hasher.depth(), 0);
    }
}
