//! Content hash loaders: resolve a source path to the hash of its bytes.
//!
//! Factories only ever see the [`FileHashLoader`] trait. Loader failures are
//! propagated unchanged; a missing file that is a hashed input is a real
//! build error.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use keystone_common::source_path::{is_repository_relative, path_key};
use keystone_common::{ContentHash, SourcePath};

/// Resolves source paths to content hashes.
///
/// Implementations are shared between threads keying different rules
/// concurrently.
pub trait FileHashLoader: Send + Sync {
    /// Returns the content hash of the file behind `path`.
    fn hash(&self, path: &SourcePath) -> Result<ContentHash, HashError>;
}

/// A content hash could not be computed.
#[derive(Debug, thiserror::Error)]
#[error("failed to hash {path}: {source}")]
pub struct HashError {
    /// The input that could not be hashed.
    pub path: SourcePath,
    /// The underlying I/O failure.
    pub source: io::Error,
}

impl HashError {
    /// Creates a hash error for `path`.
    pub fn new(path: SourcePath, source: io::Error) -> Self {
        Self { path, source }
    }

    /// The I/O error kind, e.g. `NotFound` for missing inputs.
    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

/// Hashes files on disk relative to a project root.
///
/// Archive members are read out of zip archives (jars included).
#[derive(Debug, Clone)]
pub struct FsHashLoader {
    root: PathBuf,
}

impl FsHashLoader {
    /// Creates a loader resolving relative paths against `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a repository-relative path under the root, refusing paths
    /// that would leave it.
    fn resolve(&self, relative: &Path) -> io::Result<PathBuf> {
        if !is_repository_relative(relative) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is outside the project root", relative.display()),
            ));
        }
        Ok(self.root.join(relative))
    }

    fn hash_file(&self, relative: &Path) -> io::Result<ContentHash> {
        let content = std::fs::read(self.resolve(relative)?)?;
        Ok(ContentHash::from_bytes(&content))
    }

    fn hash_member(&self, archive: &SourcePath, member: &Path) -> io::Result<ContentHash> {
        if let SourcePath::ArchiveMember { .. } = archive {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "nested archives are not supported",
            ));
        }
        let file = File::open(self.resolve(archive.relative_path())?)?;
        let mut zip = zip::ZipArchive::new(BufReader::new(file)).map_err(zip_error)?;
        let mut entry = zip.by_name(&path_key(member)).map_err(zip_error)?;
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        Ok(ContentHash::from_bytes(&content))
    }
}

impl FileHashLoader for FsHashLoader {
    fn hash(&self, path: &SourcePath) -> Result<ContentHash, HashError> {
        let result = match path {
            SourcePath::Path(relative) | SourcePath::BuildTargetOutput { path: relative, .. } => {
                self.hash_file(relative)
            }
            SourcePath::ArchiveMember { archive, member } => self.hash_member(archive, member),
        };
        result.map_err(|e| HashError::new(path.clone(), e))
    }
}

fn zip_error(err: zip::result::ZipError) -> io::Error {
    match err {
        zip::result::ZipError::Io(e) => e,
        zip::result::ZipError::FileNotFound => {
            io::Error::new(io::ErrorKind::NotFound, "member not found in archive")
        }
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

/// A fixed table of content hashes.
///
/// Useful when hashes are already known, e.g. from a file watcher. Paths not
/// in the table fail with `NotFound`.
#[derive(Debug, Clone, Default)]
pub struct MemoryHashLoader {
    hashes: HashMap<SourcePath, ContentHash>,
}

impl MemoryHashLoader {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the hash of `content` for `path`.
    pub fn with_content(mut self, path: SourcePath, content: &[u8]) -> Self {
        self.insert(path, ContentHash::from_bytes(content));
        self
    }

    /// Records a hash for `path`, replacing any previous one.
    pub fn insert(&mut self, path: SourcePath, hash: ContentHash) {
        self.hashes.insert(path, hash);
    }
}

impl FromIterator<(SourcePath, ContentHash)> for MemoryHashLoader {
    fn from_iter<I: IntoIterator<Item = (SourcePath, ContentHash)>>(iter: I) -> Self {
        Self {
            hashes: iter.into_iter().collect(),
        }
    }
}

impl FileHashLoader for MemoryHashLoader {
    fn hash(&self, path: &SourcePath) -> Result<ContentHash, HashError> {
        self.hashes.get(path).copied().ok_or_else(|| {
            HashError::new(
                path.clone(),
                io::Error::new(io::ErrorKind::NotFound, "no content hash recorded"),
            )
        })
    }
}
