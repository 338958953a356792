//! Rule key computation for the keystone build engine.
//!
//! A rule key is a content-addressed fingerprint of a build rule: equal keys
//! mean the rule's output can be reused from cache. Besides plain keys this
//! crate computes dependency-file keys, which only hash the covered inputs a
//! previous execution reported as used, and manifest keys, under which those
//! historical dependency files are indexed.

#![warn(missing_docs)]

pub mod accumulator;
pub mod dep_entry;
pub mod error;
pub mod factory;
pub mod hasher;
pub mod loader;
pub mod rule;
pub mod rule_key;
pub mod value;

pub use accumulator::{Accumulator, InputPolicy, InputSink};
pub use dep_entry::{DependencyEntry, ParseEntryError};
pub use error::RuleKeyError;
pub use factory::{DefaultRuleKeyFactory, DependencyFileRuleKeyFactory};
pub use loader::{FileHashLoader, FsHashLoader, HashError, MemoryHashLoader};
pub use rule::{RuleDescription, RuleKeyFieldLoader, SupportsDependencyFileRuleKey};
pub use rule_key::{KeyType, RuleKey, RuleKeyAndInputs};
pub use value::{
    fields_from_descriptors, AddsToRuleKey, ArchiveDependencies, FieldDescriptor, RuleField,
    RuleValue,
};
