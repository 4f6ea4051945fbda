//! Filesystem operations module.
//!
//! The orchestrator and the walker see both endpoints through the same
//! `Filesystem` trait:
//! - stat and list for enumeration
//! - idempotent directory creation
//! - content digests, with `Digest::Absent` for missing paths
//!
//! `LocalFilesystem` uses std::fs; `RemoteFilesystem` forwards to a
//! `Transport`. Code outside this module never branches on which one it has.

use std::fs;
use std::io;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

use crate::checksums::{Digest, DigestOracle};
use crate::error::EngineError;
use crate::model::{DirEntry, EndpointKind, FileStat};
use crate::paths;
use crate::transport::Transport;

/// Uniform view of one endpoint's filesystem.
pub trait Filesystem {
    /// Which endpoint this is (for log messages).
    fn kind(&self) -> EndpointKind;

    /// Stat a path; `Ok(None)` when it does not exist.
    fn stat(&self, path: &str) -> Result<Option<FileStat>, EngineError>;

    /// Entries of a directory, in whatever order the endpoint returns them.
    /// Symlinks to files are reported as files; broken links are left out.
    fn list(&self, path: &str) -> Result<Vec<DirEntry>, EngineError>;

    /// Create one directory. Existing directories are left alone.
    fn make_dir(&self, path: &str) -> Result<(), EngineError>;

    /// Digest of a file's content; `Digest::Absent` when it does not exist.
    fn digest(&self, path: &str) -> Result<Digest, EngineError>;

    /// Create a directory and any missing parents.
    ///
    /// # Errors
    /// Returns `DirectoryCreationFailed` if a component exists as a file.
    fn create_dir_all(&self, path: &str) -> Result<(), EngineError> {
        for dir in paths::ancestors(path) {
            match self.stat(&dir)? {
                Some(stat) if stat.is_dir => {}
                Some(_) => {
                    return Err(EngineError::DirectoryCreationFailed {
                        path: dir,
                        message: "path exists and is not a directory".to_string(),
                    })
                }
                None => self.make_dir(&dir)?,
            }
        }
        Ok(())
    }
}

/// The filesystem of the machine running the engine.
///
/// `list` leaves directory symlinks out, so a link back to an ancestor
/// cannot make the walk revisit a subtree.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem {
    oracle: DigestOracle,
}

impl LocalFilesystem {
    pub fn new(oracle: DigestOracle) -> Self {
        LocalFilesystem { oracle }
    }
}

fn local_stat(metadata: &fs::Metadata) -> FileStat {
    FileStat {
        is_dir: metadata.is_dir(),
        size: if metadata.is_dir() { 0 } else { metadata.len() },
        mtime: metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs()),
    }
}

impl Filesystem for LocalFilesystem {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Local
    }

    fn stat(&self, path: &str) -> Result<Option<FileStat>, EngineError> {
        match fs::metadata(path) {
            Ok(metadata) => Ok(Some(local_stat(&metadata))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::local_io(path, e)),
        }
    }

    fn list(&self, path: &str) -> Result<Vec<DirEntry>, EngineError> {
        let enumeration_error = |e: io::Error| EngineError::EnumerationFailed {
            path: path.to_string(),
            message: e.to_string(),
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(path).map_err(enumeration_error)? {
            let entry = entry.map_err(enumeration_error)?;
            let file_type = entry.file_type().map_err(enumeration_error)?;
            let metadata = if file_type.is_symlink() {
                // Linked files count as files; linked directories are never entered.
                match fs::metadata(entry.path()) {
                    Ok(target) if target.is_dir() => {
                        debug!("not following directory symlink {}", entry.path().display());
                        continue;
                    }
                    Ok(target) => target,
                    Err(e) => {
                        warn!("skipping broken symlink {}: {}", entry.path().display(), e);
                        continue;
                    }
                }
            } else {
                entry.metadata().map_err(enumeration_error)?
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                stat: local_stat(&metadata),
            });
        }
        Ok(entries)
    }

    fn make_dir(&self, path: &str) -> Result<(), EngineError> {
        match fs::create_dir(path) {
            Ok(()) => {
                debug!("created local directory {}", path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && is_local_dir(path) => Ok(()),
            Err(e) => Err(EngineError::DirectoryCreationFailed {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn digest(&self, path: &str) -> Result<Digest, EngineError> {
        if self.stat(path)?.is_none() {
            return Ok(Digest::Absent);
        }
        self.oracle.local_digest(path)
    }

    fn create_dir_all(&self, path: &str) -> Result<(), EngineError> {
        fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreationFailed {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

fn is_local_dir(path: &str) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// The remote host's filesystem, reached through a `Transport`.
#[derive(Clone, Copy)]
pub struct RemoteFilesystem<'t> {
    transport: &'t dyn Transport,
    oracle: DigestOracle,
}

impl<'t> RemoteFilesystem<'t> {
    pub fn new(transport: &'t dyn Transport, oracle: DigestOracle) -> Self {
        RemoteFilesystem { transport, oracle }
    }
}

impl Filesystem for RemoteFilesystem<'_> {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Remote
    }

    fn stat(&self, path: &str) -> Result<Option<FileStat>, EngineError> {
        self.transport.stat(path)
    }

    fn list(&self, path: &str) -> Result<Vec<DirEntry>, EngineError> {
        self.transport.list_directory(path)
    }

    fn make_dir(&self, path: &str) -> Result<(), EngineError> {
        self.transport.make_directory(path)
    }

    fn digest(&self, path: &str) -> Result<Digest, EngineError> {
        self.oracle.remote_digest(self.transport, path)
    }
}
