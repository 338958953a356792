//! Values a rule contributes to its key.
//!
//! [`RuleValue`] is a closed set of foldable kinds; the accumulator has one
//! handler per kind. Rules describe themselves as an ordered list of
//! [`RuleField`]s.

use std::collections::BTreeMap;

use keystone_common::{BuildTarget, SourcePath};

/// A value folded into a rule key.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleValue {
    /// An absent value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// An input whose content may be hashed. How it is folded is decided by
    /// the factory computing the key.
    SourcePath(SourcePath),
    /// An input whose path matters but whose content never does.
    NonHashingPath(SourcePath),
    /// A reference to another build rule.
    BuildRule(BuildTarget),
    /// An ordered list.
    List(Vec<RuleValue>),
    /// A map with sorted string keys.
    Map(BTreeMap<String, RuleValue>),
    /// An optional value.
    Optional(Option<Box<RuleValue>>),
    /// A nested object contributing its own fields.
    Appendable(Vec<RuleField>),
    /// Archives whose individual members may be tracked by dependency files.
    Archives(ArchiveDependencies),
}

impl RuleValue {
    /// A list of source paths.
    pub fn paths<I>(paths: I) -> Self
    where
        I: IntoIterator<Item = SourcePath>,
    {
        RuleValue::List(paths.into_iter().map(RuleValue::SourcePath).collect())
    }

    /// A list of strings.
    pub fn strings<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RuleValue::List(strings.into_iter().map(|s| RuleValue::Str(s.into())).collect())
    }

    /// An optional value.
    pub fn optional(value: Option<RuleValue>) -> Self {
        RuleValue::Optional(value.map(Box::new))
    }

    /// A nested object's fields.
    pub fn appendable<A: AddsToRuleKey + ?Sized>(value: &A) -> Self {
        RuleValue::Appendable(value.rule_key_fields())
    }
}

impl From<bool> for RuleValue {
    fn from(value: bool) -> Self {
        RuleValue::Bool(value)
    }
}

impl From<i64> for RuleValue {
    fn from(value: i64) -> Self {
        RuleValue::Int(value)
    }
}

impl From<&str> for RuleValue {
    fn from(value: &str) -> Self {
        RuleValue::Str(value.to_string())
    }
}

impl From<String> for RuleValue {
    fn from(value: String) -> Self {
        RuleValue::Str(value)
    }
}

impl From<SourcePath> for RuleValue {
    fn from(value: SourcePath) -> Self {
        RuleValue::SourcePath(value)
    }
}

/// A named value in a rule's description.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleField {
    /// Field name, folded as the key of the field's scope.
    pub name: String,
    /// Field value.
    pub value: RuleValue,
}

impl RuleField {
    /// Creates a field.
    pub fn new(name: impl Into<String>, value: impl Into<RuleValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Archives consumed by a rule, together with the members they contain.
///
/// Dependency-file keys track members individually, so they fold `members`;
/// plain keys fold the archives themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDependencies {
    /// The archive files.
    pub archives: Vec<SourcePath>,
    /// Every member of every archive, as [`SourcePath::ArchiveMember`]s.
    pub members: Vec<SourcePath>,
}

/// A typed object that can be nested inside a rule's fields.
pub trait AddsToRuleKey {
    /// The object's fields in a fixed order.
    fn rule_key_fields(&self) -> Vec<RuleField>;
}

/// One entry of a rule type's static field list.
pub struct FieldDescriptor<R: ?Sized> {
    /// Field name.
    pub name: &'static str,
    /// Reads the field from a rule instance.
    pub get: fn(&R) -> RuleValue,
}

impl<R: ?Sized> FieldDescriptor<R> {
    /// Creates a descriptor.
    pub const fn new(name: &'static str, get: fn(&R) -> RuleValue) -> Self {
        Self { name, get }
    }
}

/// Reads every described field from `rule`, in descriptor order.
pub fn fields_from_descriptors<R: ?Sized>(
    descriptors: &[FieldDescriptor<R>],
    rule: &R,
) -> Vec<RuleField> {
    descriptors
        .iter()
        .map(|d| RuleField {
            name: d.name.to_string(),
            value: (d.get)(rule),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tool {
        path: SourcePath,
        version: i64,
    }

    impl AddsToRuleKey for Tool {
        fn rule_key_fields(&self) -> Vec<RuleField> {
            vec![
                RuleField::new("path", RuleValue::NonHashingPath(self.path.clone())),
                RuleField::new("version", self.version),
            ]
        }
    }

    fn tool_path(tool: &Tool) -> RuleValue {
        RuleValue::NonHashingPath(tool.path.clone())
    }

    fn tool_version(tool: &Tool) -> RuleValue {
        RuleValue::Int(tool.version)
    }

    static TOOL_FIELDS: &[FieldDescriptor<Tool>] = &[
        FieldDescriptor::new("path", tool_path),
        FieldDescriptor::new("version", tool_version),
    ];

    #[test]
    fn descriptors_follow_declared_order() {
        let tool = Tool {
            path: SourcePath::path("bin/cc"),
            version: 3,
        };
        let fields = fields_from_descriptors(TOOL_FIELDS, &tool);
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["path", "version"]);
        assert_eq!(fields, tool.rule_key_fields());
    }

    #[test]
    fn appendable_wraps_fields() {
        let tool = Tool {
            path: SourcePath::path("bin/cc"),
            version: 1,
        };
        match RuleValue::appendable(&tool) {
            RuleValue::Appendable(fields) => assert_eq!(fields.len(), 2),
            other => panic!("expected appendable, got {other:?}"),
        }
    }

    #[test]
    fn list_helpers() {
        assert_eq!(
            RuleValue::strings(["-O2"]),
            RuleValue::List(vec![RuleValue::Str("-O2".to_string())])
        );
        assert_eq!(
            RuleValue::paths([SourcePath::path("a.c")]),
            RuleValue::List(vec![RuleValue::SourcePath(SourcePath::path("a.c"))])
        );
        assert_eq!(RuleValue::optional(None), RuleValue::Optional(None));
    }
}
