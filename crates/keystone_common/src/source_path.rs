//! References to rule inputs: repository files, other rules' outputs, and
//! members of archives.

use serde::Serialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::target::BuildTarget;

/// An immutable reference to a rule input.
///
/// Identity is the normalized path: two `SourcePath`s built from `a/./b.h`
/// and `a/b.h` compare equal.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SourcePath {
    /// A repository-relative file.
    Path(PathBuf),
    /// A file produced by another rule, located at `path` relative to the
    /// repository root.
    BuildTargetOutput {
        /// The producing rule.
        target: BuildTarget,
        /// Repository-relative location of the output.
        path: PathBuf,
    },
    /// A file stored inside an archive such as a jar or zip.
    ArchiveMember {
        /// The archive containing the member.
        archive: Box<SourcePath>,
        /// Path of the member inside the archive.
        member: PathBuf,
    },
}

impl SourcePath {
    /// A repository-relative file, normalized.
    pub fn path(path: impl AsRef<Path>) -> Self {
        SourcePath::Path(normalize(path.as_ref()))
    }

    /// The output of `target` at the given repository-relative location.
    pub fn output(target: BuildTarget, path: impl AsRef<Path>) -> Self {
        SourcePath::BuildTargetOutput {
            target,
            path: normalize(path.as_ref()),
        }
    }

    /// A member of `archive`.
    pub fn archive_member(archive: SourcePath, member: impl AsRef<Path>) -> Self {
        SourcePath::ArchiveMember {
            archive: Box::new(archive),
            member: normalize(member.as_ref()),
        }
    }

    /// The canonical repository-relative path of the file backing this input.
    ///
    /// For archive members this is the path of the archive.
    pub fn relative_path(&self) -> &Path {
        match self {
            SourcePath::Path(path) | SourcePath::BuildTargetOutput { path, .. } => path,
            SourcePath::ArchiveMember { archive, .. } => archive.relative_path(),
        }
    }

    /// The member path, if this input lives inside an archive.
    pub fn archive_member_path(&self) -> Option<&Path> {
        match self {
            SourcePath::ArchiveMember { member, .. } => Some(member),
            _ => None,
        }
    }

    /// The producing rule for build outputs.
    pub fn build_target(&self) -> Option<&BuildTarget> {
        match self {
            SourcePath::BuildTargetOutput { target, .. } => Some(target),
            SourcePath::ArchiveMember { archive, .. } => archive.build_target(),
            SourcePath::Path(_) => None,
        }
    }

    /// File extension of the input (of the member, for archive members).
    pub fn extension(&self) -> Option<&str> {
        let path = self.archive_member_path().unwrap_or(self.relative_path());
        path.extension().and_then(|e| e.to_str())
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourcePath::Path(path) => f.write_str(&path_key(path)),
            SourcePath::BuildTargetOutput { target, path } => {
                write!(f, "{target}[{}]", path_key(path))
            }
            SourcePath::ArchiveMember { archive, member } => {
                write!(f, "{archive}!{}", path_key(member))
            }
        }
    }
}

impl fmt::Debug for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourcePath({self})")
    }
}

/// Lexically normalizes a relative path: drops `.` components and folds `..`
/// into the preceding normal component where one exists.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// Whether `path` stays inside the repository: relative, and not climbing
/// above the root once normalized.
pub fn is_repository_relative(path: &Path) -> bool {
    if path.has_root() {
        return false;
    }
    let normalized = normalize(path);
    normalized.components().next().is_some()
        && normalized
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Renders a path with `/` separators regardless of platform.
///
/// Used wherever a path feeds a key, so keys agree across machines.
pub fn path_key(path: &Path) -> String {
    let mut key = String::new();
    for component in path.components() {
        match component {
            Component::RootDir => key.push('/'),
            other => {
                if !key.is_empty() && !key.ends_with('/') {
                    key.push('/');
                }
                key.push_str(&other.as_os_str().to_string_lossy());
            }
        }
    }
    key
}
