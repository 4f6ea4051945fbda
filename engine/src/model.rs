//! Core data model for synchronization runs.
//!
//! This module defines the values passed between the walker, the transfer
//! engine and the orchestrator:
//! - Direction, EndpointKind: which way bytes flow and where a path lives
//! - FileStat, DirEntry: what a filesystem listing returns
//! - TreeEntry: one directory of a recursive walk
//! - TransferJob: a single file to move and verify
//! - FileOutcome, SyncReport: what a finished job or run produced
//!
//! All paths are strings with forward slashes (see `paths::normalize`), so the
//! same values describe local and remote locations.

use std::fmt;
use uuid::Uuid;

use crate::checksums::Digest;
use crate::paths;

/// Which way a job moves bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local source, remote destination (upload)
    Send,
    /// Remote source, local destination (download)
    Receive,
}

impl Direction {
    /// Endpoint the source path lives on.
    pub fn source_kind(&self) -> EndpointKind {
        match self {
            Direction::Send => EndpointKind::Local,
            Direction::Receive => EndpointKind::Remote,
        }
    }

    /// Endpoint the destination path lives on.
    pub fn destination_kind(&self) -> EndpointKind {
        match self {
            Direction::Send => EndpointKind::Remote,
            Direction::Receive => EndpointKind::Local,
        }
    }

    /// Word used in the per-file success notice.
    pub fn past_tense(&self) -> &'static str {
        match self {
            Direction::Send => "sent",
            Direction::Receive => "received",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "Send"),
            Direction::Receive => write!(f, "Receive"),
        }
    }
}

/// The two filesystems a run spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Reached through ordinary system calls
    Local,
    /// Reached through the Transport
    Remote,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Local => write!(f, "local"),
            EndpointKind::Remote => write!(f, "remote"),
        }
    }
}

/// Result of a stat call on either endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_dir: bool,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Modification time, seconds since the Unix epoch
    pub mtime: Option<u64>,
}

impl FileStat {
    pub fn file(size: u64) -> Self {
        FileStat {
            is_dir: false,
            size,
            mtime: None,
        }
    }

    pub fn directory() -> Self {
        FileStat {
            is_dir: true,
            size: 0,
            mtime: None,
        }
    }
}

/// One name in a directory listing, with its stat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub stat: FileStat,
}

/// One directory visited by a recursive walk.
///
/// Names are bare entry names, not paths. The walker leaves them in listing
/// order; call `sorted` before dispatching work from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Full (normalized) path of the directory
    pub directory: String,
    pub subdirectories: Vec<String>,
    pub files: Vec<String>,
}

impl TreeEntry {
    /// Return this entry with subdirectory and file names in byte order.
    pub fn sorted(mut self) -> Self {
        self.subdirectories.sort();
        self.files.sort();
        self
    }
}

/// A single file to transfer and verify.
///
/// Created per file by the orchestrator and dropped when the job finishes.
#[derive(Debug, Clone)]
pub struct TransferJob {
    /// Unique identifier, recorded on the job's log span
    pub id: Uuid,
    pub source_path: String,
    pub destination_path: String,
    pub direction: Direction,
}

impl TransferJob {
    pub fn new(source_path: &str, destination_path: &str, direction: Direction) -> Self {
        TransferJob {
            id: Uuid::new_v4(),
            source_path: paths::normalize(source_path),
            destination_path: paths::normalize(destination_path),
            direction,
        }
    }

    /// Base name of the source, used in progress lines and notices.
    pub fn file_name(&self) -> &str {
        paths::base_name(&self.source_path)
    }
}

/// What a finished job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub source_path: String,
    pub destination_path: String,
    pub direction: Direction,
    /// Physical transfers performed (0 when the pre-check already matched)
    pub attempts: u32,
    /// Digest both ends agree on
    pub digest: Digest,
}

impl FileOutcome {
    /// True when the destination already held the source content.
    pub fn skipped(&self) -> bool {
        self.attempts == 0
    }
}

/// Every file a `send` or `receive` call completed, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub direction: Direction,
    pub files: Vec<FileOutcome>,
}

impl SyncReport {
    pub fn new(direction: Direction) -> Self {
        SyncReport {
            direction,
            files: Vec::new(),
        }
    }

    /// Total physical transfers across all files.
    pub fn total_attempts(&self) -> u32 {
        self.files.iter().map(|f| f.attempts).sum()
    }

    /// Files whose destination already matched.
    pub fn skipped_count(&self) -> usize {
        self.files.iter().filter(|f| f.skipped()).count()
    }

    /// Destination paths in dispatch order.
    pub fn destination_paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.destination_path.as_str()).collect()
    }
}
