//! Progress reporting.
//!
//! This module defines:
//! - `ProgressSample`: one throughput/ETA snapshot of a running transfer
//! - `ProgressThrottle`: turns raw byte callbacks into at most one sample per
//!   second of wall-clock time
//! - `ProgressCallback`: the trait a front end implements to receive samples
//!   and per-file notices, decoupling the engine from any output technology
//!
//! Timing state lives in the throttle, which the transfer engine creates fresh
//! for every transfer attempt and drops afterwards. Nothing here is shared
//! between jobs.

use std::fmt;
use std::time::{Duration, Instant};

use crate::model::{FileOutcome, TransferJob};

/// Minimum wall-clock gap between two rendered samples.
pub const RENDER_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot of a transfer in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
}

impl ProgressSample {
    /// Fraction done in `[0, 1]`. An empty file counts as done.
    pub fn ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.bytes_transferred as f64 / self.total_bytes as f64
        }
    }

    /// Average speed since the attempt started, in KB/s.
    pub fn speed_kb_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.bytes_transferred as f64 / secs / 1024.0
        }
    }

    /// Seconds left at the current average rate; `None` before any progress.
    pub fn eta_secs(&self) -> Option<f64> {
        let ratio = self.ratio();
        if ratio <= 0.0 {
            None
        } else {
            Some(self.elapsed.as_secs_f64() * (1.0 - ratio) / ratio)
        }
    }

    /// One-line human-readable rendering, prefixed with the file name.
    pub fn render(&self, name: &str) -> String {
        let eta = match self.eta_secs() {
            Some(secs) => format!("{:.2}s", secs),
            None => "unknown".to_string(),
        };
        format!(
            "{}: {} / {} ({:.2}%), speed: {:.2} KB/s, estimate time left: {}.",
            name,
            self.bytes_transferred,
            self.total_bytes,
            self.ratio() * 100.0,
            self.speed_kb_per_sec(),
            eta
        )
    }
}

impl fmt::Display for ProgressSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} ({:.2}%)",
            self.bytes_transferred,
            self.total_bytes,
            self.ratio() * 100.0
        )
    }
}

/// Per-attempt timing state for one transfer.
#[derive(Debug, Clone, Copy)]
pub struct ProgressThrottle {
    started: Instant,
    last_render: Instant,
}

impl ProgressThrottle {
    /// Start timing now.
    pub fn start() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Start timing at a given instant.
    pub fn starting_at(now: Instant) -> Self {
        ProgressThrottle {
            started: now,
            last_render: now,
        }
    }

    /// Feed a byte-count callback observed now.
    pub fn observe(&mut self, bytes_so_far: u64, total_bytes: u64) -> Option<ProgressSample> {
        self.observe_at(Instant::now(), bytes_so_far, total_bytes)
    }

    /// Feed a byte-count callback observed at `now`.
    ///
    /// Returns a sample only when at least `RENDER_INTERVAL` has passed since
    /// the previous sample (or since the start, for the first one).
    pub fn observe_at(
        &mut self,
        now: Instant,
        bytes_so_far: u64,
        total_bytes: u64,
    ) -> Option<ProgressSample> {
        if now.saturating_duration_since(self.last_render) < RENDER_INTERVAL {
            return None;
        }
        self.last_render = now;
        Some(ProgressSample {
            bytes_transferred: bytes_so_far,
            total_bytes,
            elapsed: now.saturating_duration_since(self.started),
        })
    }
}

/// Why a file is being transferred again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendReason {
    /// The destination already existed with different content
    DestinationDiffers,
    /// The digest check after transfer attempt `attempt` failed
    VerificationFailed { attempt: u32 },
}

/// Trait for receiving progress updates from the transfer engine.
///
/// All methods are called synchronously on the thread running the job.
pub trait ProgressCallback: Send + Sync {
    /// Called when a job is about to run its pre-check.
    fn on_file_started(&self, job: &TransferJob);

    /// Called with a throttled sample while bytes are moving.
    fn on_file_progress(&self, job: &TransferJob, sample: &ProgressSample);

    /// Called before a file is transferred again.
    fn on_resend(&self, job: &TransferJob, reason: ResendReason);

    /// Called once digests on both ends agree.
    fn on_file_completed(&self, job: &TransferJob, outcome: &FileOutcome);
}
