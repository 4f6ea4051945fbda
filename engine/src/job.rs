//! Transfer engine: one file, transferred until both ends hold the same bytes.
//!
//! `run_job` drives a single `TransferJob` through its states:
//! 1. Pre-check: digest the source and the destination.
//! 2. If the destination already matches (and skipping is enabled), done.
//! 3. Transfer the whole file through the Transport, reporting progress.
//! 4. Verify: digest the destination again and compare with the source.
//! 5. On mismatch, back off and go to 3 while the retry policy allows it.
//!
//! A file is only reported as completed when the two digests are equal and
//! present. Running out of attempts is `EngineError::RetriesExhausted`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, info_span, warn};

use crate::checksums::{Digest, DigestOracle};
use crate::config::SyncOptions;
use crate::error::EngineError;
use crate::fs_ops::{Filesystem, LocalFilesystem, RemoteFilesystem};
use crate::model::{Direction, FileOutcome, TransferJob};
use crate::paths;
use crate::progress::{ProgressCallback, ProgressThrottle, ResendReason};
use crate::transport::Transport;

/// How often, and how patiently, a file is re-sent after failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total transfer attempts per file; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Delay before the first resend, in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for the doubling delay, in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: Some(5),
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Retry forever with the default backoff.
    pub fn unbounded() -> Self {
        RetryPolicy {
            max_attempts: None,
            ..RetryPolicy::default()
        }
    }

    /// Retry without any delay between attempts.
    pub fn immediate(max_attempts: Option<u32>) -> Self {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Whether attempt number `attempt` (1-based) may run.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

/// Shared state for every job of one run: the Transport and the options.
#[derive(Clone, Copy)]
pub struct SyncContext<'t> {
    transport: &'t dyn Transport,
    options: &'t SyncOptions,
}

impl<'t> SyncContext<'t> {
    pub fn new(transport: &'t dyn Transport, options: &'t SyncOptions) -> Self {
        SyncContext { transport, options }
    }

    pub fn transport(&self) -> &'t dyn Transport {
        self.transport
    }

    pub fn options(&self) -> &'t SyncOptions {
        self.options
    }

    pub fn oracle(&self) -> DigestOracle {
        DigestOracle::new(self.options.algorithm)
    }

    pub fn local(&self) -> LocalFilesystem {
        LocalFilesystem::new(self.oracle())
    }

    pub fn remote(&self) -> RemoteFilesystem<'t> {
        RemoteFilesystem::new(self.transport, self.oracle())
    }
}

/// Run one job to verified completion.
///
/// # Errors
/// - `SourceNotFound` if the source file does not exist
/// - `RetriesExhausted` if digests never agree within the retry policy
/// - any Transport, local I/O or directory creation error, unretried
pub fn run_job(
    ctx: &SyncContext<'_>,
    job: &TransferJob,
    callback: Option<&dyn ProgressCallback>,
) -> Result<FileOutcome, EngineError> {
    let span = info_span!("job", id = %job.id, direction = %job.direction);
    let _guard = span.enter();

    ctx.transport.set_keepalive(ctx.options.keepalive_secs);
    if let Some(cb) = callback {
        cb.on_file_started(job);
    }

    let local = ctx.local();
    let remote = ctx.remote();
    let (source_fs, dest_fs): (&dyn Filesystem, &dyn Filesystem) = match job.direction {
        Direction::Send => (&local, &remote),
        Direction::Receive => (&remote, &local),
    };

    let source_digest = source_fs.digest(&job.source_path)?;
    if source_digest.is_absent() {
        return Err(EngineError::SourceNotFound {
            path: job.source_path.clone(),
        });
    }
    let existing = dest_fs.digest(&job.destination_path)?;
    debug!(
        "pre-check {}: source {} destination {}",
        job.file_name(),
        source_digest,
        existing
    );

    if ctx.options.skip_unchanged && existing.confirms(&source_digest) {
        info!("{} is already up to date", job.destination_path);
        return Ok(complete(job, 0, source_digest, callback));
    }
    if !existing.is_absent() && !existing.confirms(&source_digest) {
        info!("{} differs at destination, resending", job.file_name());
        if let Some(cb) = callback {
            cb.on_resend(job, ResendReason::DestinationDiffers);
        }
    }

    dest_fs.create_dir_all(&paths::parent_dir(&job.destination_path))?;

    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let bytes = transfer_once(ctx, job, callback)?;
        let verified = dest_fs.digest(&job.destination_path)?;
        debug!(
            "attempt {} moved {} bytes, destination digest {}",
            attempts, bytes, verified
        );

        if verified.confirms(&source_digest) {
            break;
        }

        if !ctx.options.retry.allows_attempt(attempts + 1) {
            warn!(
                "{} still differs after {} attempts, giving up",
                job.file_name(),
                attempts
            );
            return Err(EngineError::RetriesExhausted {
                path: job.destination_path.clone(),
                attempts,
            });
        }

        warn!(
            "{} checksum mismatch after attempt {}, resending",
            job.file_name(),
            attempts
        );
        if let Some(cb) = callback {
            cb.on_resend(job, ResendReason::VerificationFailed { attempt: attempts });
        }
        let delay = ctx.options.retry.backoff(attempts);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    info!(
        "{} {} successfully after {} attempt(s)",
        job.file_name(),
        job.direction.past_tense(),
        attempts
    );
    Ok(complete(job, attempts, source_digest, callback))
}

fn complete(
    job: &TransferJob,
    attempts: u32,
    digest: Digest,
    callback: Option<&dyn ProgressCallback>,
) -> FileOutcome {
    let outcome = FileOutcome {
        source_path: job.source_path.clone(),
        destination_path: job.destination_path.clone(),
        direction: job.direction,
        attempts,
        digest,
    };
    if let Some(cb) = callback {
        cb.on_file_completed(job, &outcome);
    }
    outcome
}

/// One physical transfer with fresh progress timing.
fn transfer_once(
    ctx: &SyncContext<'_>,
    job: &TransferJob,
    callback: Option<&dyn ProgressCallback>,
) -> Result<u64, EngineError> {
    let mut throttle = ProgressThrottle::start();
    let mut on_bytes = |sent: u64, total: u64| {
        if let Some(sample) = throttle.observe(sent, total) {
            if let Some(cb) = callback {
                cb.on_file_progress(job, &sample);
            }
        }
    };

    match job.direction {
        Direction::Send => ctx.transport.upload_file(
            Path::new(&job.source_path),
            &job.destination_path,
            &mut on_bytes,
        ),
        Direction::Receive => ctx.transport.download_file(
            &job.source_path,
            Path::new(&job.destination_path),
            &mut on_bytes,
        ),
    }
}
