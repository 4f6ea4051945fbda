//! # Sync Engine - Checksum-Verified Remote Transfer Library
//!
//! A headless engine that copies a file or a directory tree between this
//! machine and a remote host over SSH/SFTP, and only reports a file as done
//! once both ends hold byte-identical content.
//!
//! ## Overview
//!
//! The engine features:
//! - One `Filesystem` abstraction over the local disk and the remote host
//! - Lazy recursive tree walking with deterministic (sorted) dispatch
//! - Per-file transfer that retries until source and destination digests agree
//! - Throttled progress reporting via callbacks (decoupled from UI technology)
//! - A parallel post-sync audit and a tar/pigz archive helper
//!
//! ## Basic Usage
//!
//! ```no_run
//! use syncengine::{send, ConnectionConfig, SshTransport, SyncContext, SyncOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = SshTransport::connect(&ConnectionConfig {
//!     host: "backup.example.org".to_string(),
//!     port: 22,
//!     username: "archive".to_string(),
//!     password: None,
//! })?;
//! let options = SyncOptions::default();
//! let ctx = SyncContext::new(&transport, &options);
//!
//! // Upload /data/photos to /backup/photos
//! let report = send(&ctx, "/data/photos", "/backup", None)?;
//! for file in &report.files {
//!     println!("{} ({} attempts)", file.destination_path, file.attempts);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (TransferJob, TreeEntry, FileOutcome)
//! - **error**: Error types and handling
//! - **paths**: Separator-independent path arithmetic
//! - **checksums**: Digest algorithms and the local/remote checksum oracle
//! - **transport**: The remote capability trait
//! - **ssh**: SSH/SFTP implementation of the transport
//! - **fs_ops**: Local and remote filesystems behind one trait
//! - **walk**: Recursive tree walker
//! - **progress**: Progress samples, throttling and the callback trait
//! - **job**: Retry-until-verified transfer of one file
//! - **sync**: Send/receive orchestration
//! - **audit**: Parallel local/remote digest comparison
//! - **archive**: tar/pigz packing with size-based splitting
//! - **config**: Connection parameters and engine options

pub mod model;
pub mod error;
pub mod paths;
pub mod checksums;
pub mod transport;
pub mod ssh;
pub mod fs_ops;
pub mod walk;
pub mod progress;
pub mod job;
pub mod sync;
pub mod audit;
pub mod archive;
pub mod config;

// Re-export main types and functions
pub use model::{
    DirEntry, Direction, EndpointKind, FileOutcome, FileStat, SyncReport, TransferJob, TreeEntry,
};
pub use error::EngineError;
pub use checksums::{ChecksumAlgorithm, Digest, DigestOracle};
pub use transport::Transport;
pub use ssh::SshTransport;
pub use fs_ops::{Filesystem, LocalFilesystem, RemoteFilesystem};
pub use walk::walk;
pub use progress::{ProgressCallback, ProgressSample, ResendReason};
pub use job::{run_job, RetryPolicy, SyncContext};
pub use sync::{receive, send, synchronize};
pub use audit::{audit, default_workers, AuditRecord, AuditReport, AuditStatus};
pub use archive::{parse_size, Compressor};
pub use config::{ConfigFile, ConnectionConfig, ConnectionOverrides, SyncOptions};
