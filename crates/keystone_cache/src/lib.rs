//! Dependency file and manifest storage.
//!
//! A build that used a dependency-file key writes the list of inputs it
//! actually read to a dependency file, and records the resulting key under
//! the rule's manifest key. A later build computes the manifest key, looks up
//! a recorded key whose inputs are unchanged, and can fetch by that key
//! without executing the rule first.

#![warn(missing_docs)]

pub mod dep_file;
pub mod error;
pub mod manifest;
pub mod store;

pub use dep_file::{load_dep_file, parse_dep_file, save_dep_file};
pub use error::CacheError;
pub use manifest::{DepFileManifest, ManifestEntry, RecordedInput};
pub use store::ManifestStore;
