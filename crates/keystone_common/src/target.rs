//! Build target names of the form `//base/path:name`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fully qualified build target, e.g. `//lib/foo:foo`.
///
/// The base path is stored without the leading `//`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildTarget {
    base: String,
    name: String,
}

impl BuildTarget {
    /// Creates a target from its base path (with or without `//`) and short name.
    pub fn new(base: impl Into<String>, name: impl Into<String>) -> Self {
        let base = base.into();
        let base = base.strip_prefix("//").map(str::to_string).unwrap_or(base);
        Self {
            base,
            name: name.into(),
        }
    }

    /// The base path, without the leading `//`.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The short name after the colon.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `//base:name` form.
    pub fn fully_qualified_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "//{}:{}", self.base, self.name)
    }
}

impl fmt::Debug for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuildTarget({self})")
    }
}

/// Error returned when a string is not a valid `//base:name` target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseTargetError {
    /// The string does not start with `//`.
    #[error("build target '{0}' must start with '//'")]
    MissingRoot(String),
    /// The string has no `:name` suffix, or the name is empty.
    #[error("build target '{0}' must end with ':<name>'")]
    MissingName(String),
}

impl FromStr for BuildTarget {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("//")
            .ok_or_else(|| ParseTargetError::MissingRoot(s.to_string()))?;
        match rest.rsplit_once(':') {
            Some((base, name)) if !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(base, name))
            }
            _ => Err(ParseTargetError::MissingName(s.to_string())),
        }
    }
}
