//! Remote capability set.
//!
//! The engine never talks to a network library directly. Everything it needs
//! from the remote host goes through `Transport`: running a shell command and
//! the handful of file-transfer primitives below. `ssh::SshTransport` is the
//! production implementation; tests substitute an in-memory one.
//!
//! Implementations must be `Sync`: the audit fan-out calls `stat` and
//! `execute` from several threads at once, so a transport whose channel is not
//! multiplexed has to serialize callers internally.

use std::path::Path;

use crate::error::EngineError;
use crate::model::{DirEntry, FileStat};

/// Progress hook for uploads and downloads: `(bytes_so_far, total_bytes)`.
pub type TransferProgress<'a> = &'a mut dyn FnMut(u64, u64);

/// Commands and file transfer on the remote host.
pub trait Transport: Send + Sync {
    /// Run a shell command and return its captured standard output.
    ///
    /// A non-zero exit status is an error.
    fn execute(&self, command: &str) -> Result<String, EngineError>;

    /// Stat a remote path. `Ok(None)` means the path does not exist.
    fn stat(&self, path: &str) -> Result<Option<FileStat>, EngineError>;

    /// List a remote directory (without `.` and `..`).
    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, EngineError>;

    /// Copy a whole local file to a remote path, replacing it.
    ///
    /// Returns the number of bytes written.
    fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: TransferProgress<'_>,
    ) -> Result<u64, EngineError>;

    /// Copy a whole remote file to a local path, replacing it.
    ///
    /// Returns the number of bytes written.
    fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: TransferProgress<'_>,
    ) -> Result<u64, EngineError>;

    /// Create one remote directory. Succeeds if it already exists.
    fn make_directory(&self, path: &str) -> Result<(), EngineError>;

    /// Send keepalive messages every `interval_secs` seconds (0 disables).
    fn set_keepalive(&self, interval_secs: u32);
}
