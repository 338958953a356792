//! Entries of a dependency file: the inputs a rule actually used.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use keystone_common::source_path::{normalize, path_key};
use keystone_common::SourcePath;
use serde::{Deserialize, Serialize};

/// Separator between an archive path and a member path in the textual form.
const ARCHIVE_SEPARATOR: char = '!';

/// One input recorded as used by a previous execution of a rule.
///
/// An entry is derived from a [`SourcePath`] by taking its canonical relative
/// path and, for archive members, the path inside the archive. Membership of
/// the used-entry set is decided by equality on both parts.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DependencyEntry {
    path_to_file: PathBuf,
    path_within_archive: Option<PathBuf>,
}

impl DependencyEntry {
    /// An entry for a plain file.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path_to_file: normalize(path.as_ref()),
            path_within_archive: None,
        }
    }

    /// An entry for a member of an archive.
    pub fn in_archive(archive: impl AsRef<Path>, member: impl AsRef<Path>) -> Self {
        Self {
            path_to_file: normalize(archive.as_ref()),
            path_within_archive: Some(normalize(member.as_ref())),
        }
    }

    /// Derives the entry that identifies `path`.
    pub fn from_source_path(path: &SourcePath) -> Self {
        Self {
            path_to_file: normalize(path.relative_path()),
            path_within_archive: path.archive_member_path().map(normalize),
        }
    }

    /// Canonical relative path of the file (the archive, for members).
    pub fn path_to_file(&self) -> &Path {
        &self.path_to_file
    }

    /// Member path inside the archive, if any.
    pub fn path_within_archive(&self) -> Option<&Path> {
        self.path_within_archive.as_deref()
    }
}

impl From<&SourcePath> for DependencyEntry {
    fn from(path: &SourcePath) -> Self {
        Self::from_source_path(path)
    }
}

impl fmt::Display for DependencyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&path_key(&self.path_to_file))?;
        if let Some(member) = &self.path_within_archive {
            write!(f, "{ARCHIVE_SEPARATOR}{}", path_key(member))?;
        }
        Ok(())
    }
}

impl fmt::Debug for DependencyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DependencyEntry({self})")
    }
}

/// Error returned when a dependency file line is not a valid entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid dependency entry '{0}'")]
pub struct ParseEntryError(pub String);

impl FromStr for DependencyEntry {
    type Err = ParseEntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseEntryError(s.to_string());
        match s.split_once(ARCHIVE_SEPARATOR) {
            None if !s.is_empty() => Ok(Self::new(s)),
            Some((archive, member)) if !archive.is_empty() && !member.is_empty() => {
                Ok(Self::in_archive(archive, member))
            }
            _ => Err(invalid()),
        }
    }
}

impl From<DependencyEntry> for String {
    fn from(entry: DependencyEntry) -> Self {
        entry.to_string()
    }
}

impl TryFrom<String> for DependencyEntry {
    type Error = ParseEntryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
