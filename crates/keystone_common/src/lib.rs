//! Shared foundational types for the keystone rule key engine.
//!
//! This crate provides content hashing, build target names, and source path
//! references used by every other keystone crate.

#![warn(missing_docs)]

pub mod hash;
pub mod source_path;
pub mod target;

pub use hash::{ContentHash, ParseHashError};
pub use source_path::SourcePath;
pub use target::{BuildTarget, ParseTargetError};
