//! Error types for the synchronization engine.
//!
//! `EngineError` covers everything that stops a job or a whole run. A digest
//! mismatch after a transfer is not an error: it feeds the retry loop in
//! `job`, and only becomes `RetriesExhausted` once the retry policy gives up.
//! A remote path that does not exist yet is not an error either; it is
//! modelled as `Digest::Absent`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a job, a sub-walk or the whole run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// TCP connect, SSH handshake or SFTP subsystem could not be opened
    #[error("Failed to connect to {address}: {message}")]
    Connection { address: String, message: String },

    /// The server rejected every authentication method we tried
    #[error("Authentication failed for {username}@{address}")]
    Authentication { username: String, address: String },

    /// Source file or directory does not exist on its endpoint
    #[error("Source not found: {path}")]
    SourceNotFound { path: String },

    /// Local filesystem read/write/stat failure
    #[error("Local I/O error on {path}: {source}")]
    LocalIo {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Remote file-transfer operation failed (stat, list, open, write)
    #[error("Remote operation failed on {path}: {message}")]
    Remote { path: String, message: String },

    /// Remote shell command failed or produced unusable output
    #[error("Remote command `{command}` failed: {message}")]
    RemoteCommand { command: String, message: String },

    /// Failed to create a directory on either endpoint
    #[error("Failed to create directory {path}: {message}")]
    DirectoryCreationFailed { path: String, message: String },

    /// Failed to list a directory while walking a tree
    #[error("Failed to enumerate directory {path}: {message}")]
    EnumerationFailed { path: String, message: String },

    /// Digests still disagree after the retry policy ran out of attempts
    #[error("Gave up on {path} after {attempts} attempts: checksums never matched")]
    RetriesExhausted { path: String, attempts: u32 },

    /// Path cannot be used for the requested operation
    #[error("Invalid path: {path} ({reason})")]
    InvalidPath { path: String, reason: String },

    /// Configuration file missing, unreadable or incomplete
    #[error("Configuration error in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    /// A local helper program (tar, pigz) could not be run or exited non-zero
    #[error("External command `{program}` failed: {message}")]
    ExternalCommand { program: String, message: String },
}

impl EngineError {
    /// Build a `LocalIo` error for a path.
    pub fn local_io(path: impl Into<String>, source: io::Error) -> Self {
        EngineError::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Build a `Remote` error for a path.
    pub fn remote(path: impl Into<String>, message: impl ToString) -> Self {
        EngineError::Remote {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// True for errors raised before any file work could start.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            EngineError::Connection { .. } | EngineError::Authentication { .. }
        )
    }
}
