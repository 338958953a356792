//! Rule key digests and the results factories hand back.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use keystone_common::hash::{decode_hex16, write_hex};
use keystone_common::{ParseHashError, SourcePath};
use serde::{Deserialize, Serialize};

/// A 128-bit rule key.
///
/// Ordered so that sets of keys iterate deterministically; serialized as a
/// 32 character hex string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RuleKey([u8; 16]);

impl RuleKey {
    /// Wraps a finished digest.
    pub fn from_raw(raw: [u8; 16]) -> Self {
        Self(raw)
    }

    /// Returns the digest bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleKey({self})")
    }
}

impl FromStr for RuleKey {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex16(s).map(Self)
    }
}

impl From<RuleKey> for String {
    fn from(key: RuleKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for RuleKey {
    type Error = ParseHashError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Which dependency-file key is being computed.
///
/// `DepFile` narrows covered inputs to those a previous build reported as
/// used. `Manifest` ignores the content of every covered input and reports
/// all of them, so it stays stable across builds that used different subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// The key that decides whether a rebuild can be skipped.
    DepFile,
    /// The key under which historical dependency files are indexed.
    Manifest,
}

impl KeyType {
    /// The name folded into the key.
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::DepFile => "DEP_FILE",
            KeyType::Manifest => "MANIFEST",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule key together with the source paths that were recorded while
/// computing it.
///
/// For dependency-file keys `inputs` holds the covered inputs that matched a
/// dependency entry. For manifest keys it holds every covered input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleKeyAndInputs {
    /// The computed key.
    pub rule_key: RuleKey,
    /// Recorded covered inputs.
    pub inputs: BTreeSet<SourcePath>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse() {
        let key = RuleKey::from_raw([0x1f; 16]);
        let text = key.to_string();
        assert_eq!(text, "1f".repeat(16));
        assert_eq!(text.parse::<RuleKey>().unwrap(), key);
    }

    #[test]
    fn serializes_as_hex_string() {
        let key = RuleKey::from_raw([0; 16]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", "0".repeat(32)));
        let back: RuleKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn keys_are_totally_ordered() {
        let mut keys = vec![RuleKey::from_raw([2; 16]), RuleKey::from_raw([1; 16])];
        keys.sort();
        assert_eq!(keys[0], RuleKey::from_raw([1; 16]));
    }

    #[test]
    fn key_type_names() {
        assert_eq!(KeyType::DepFile.to_string(), "DEP_FILE");
        assert_eq!(KeyType::Manifest.as_str(), "MANIFEST");
    }
}
