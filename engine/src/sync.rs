//! Sync orchestration: map a source file or tree onto a destination root.
//!
//! `send` and `receive` share one implementation over a pair of
//! `Filesystem`s. A directory source lands at
//! `destination_root/<source base name>/<relative subpath>`; every destination
//! directory exists before any file beneath it is transferred, and files are
//! dispatched one at a time in sorted order.

use tracing::info;

use crate::error::EngineError;
use crate::fs_ops::Filesystem;
use crate::job::{run_job, SyncContext};
use crate::model::{Direction, SyncReport, TransferJob};
use crate::paths;
use crate::progress::ProgressCallback;
use crate::walk::walk;

/// Upload a local file or tree into `destination_root` on the remote host.
pub fn send(
    ctx: &SyncContext<'_>,
    source: &str,
    destination_root: &str,
    callback: Option<&dyn ProgressCallback>,
) -> Result<SyncReport, EngineError> {
    synchronize(ctx, Direction::Send, source, destination_root, callback)
}

/// Download a remote file or tree into the local `destination_root`.
pub fn receive(
    ctx: &SyncContext<'_>,
    source: &str,
    destination_root: &str,
    callback: Option<&dyn ProgressCallback>,
) -> Result<SyncReport, EngineError> {
    synchronize(ctx, Direction::Receive, source, destination_root, callback)
}

/// Run `send` or `receive` depending on `direction`.
///
/// # Errors
/// - `SourceNotFound` when `source` does not exist on its endpoint
/// - the first error of any directory creation, walk or job; the run stops
///   there and files already completed stay in place
pub fn synchronize(
    ctx: &SyncContext<'_>,
    direction: Direction,
    source: &str,
    destination_root: &str,
    callback: Option<&dyn ProgressCallback>,
) -> Result<SyncReport, EngineError> {
    let local = ctx.local();
    let remote = ctx.remote();
    let (source_fs, dest_fs): (&dyn Filesystem, &dyn Filesystem) = match direction {
        Direction::Send => (&local, &remote),
        Direction::Receive => (&remote, &local),
    };

    let source = paths::normalize(source);
    let destination_root = paths::normalize(destination_root);
    let stat = source_fs
        .stat(&source)?
        .ok_or_else(|| EngineError::SourceNotFound {
            path: source.clone(),
        })?;

    let target = paths::join(&destination_root, paths::base_name(&source));
    let mut report = SyncReport::new(direction);

    if !stat.is_dir {
        let job = TransferJob::new(&source, &target, direction);
        report.files.push(run_job(ctx, &job, callback)?);
        return Ok(report);
    }

    info!(
        "{}: {} {} -> {} {}",
        direction,
        direction.source_kind(),
        source,
        direction.destination_kind(),
        target
    );
    dest_fs.create_dir_all(&target)?;

    for entry in walk(source_fs, &source) {
        let entry = entry?.sorted();
        let relative = paths::relative_to(&source, &entry.directory).ok_or_else(|| {
            EngineError::InvalidPath {
                path: entry.directory.clone(),
                reason: format!("not under source root {}", source),
            }
        })?;
        let dest_dir = paths::join(&target, &relative);
        dest_fs.create_dir_all(&dest_dir)?;

        for file in &entry.files {
            let job = TransferJob::new(
                &paths::join(&entry.directory, file),
                &paths::join(&dest_dir, file),
                direction,
            );
            report.files.push(run_job(ctx, &job, callback)?);
        }
    }

    info!(
        "{} finished: {} file(s), {} already up to date, {} transfer(s)",
        direction,
        report.files.len(),
        report.skipped_count(),
        report.total_attempts()
    );
    Ok(report)
}
