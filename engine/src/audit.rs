//! Post-sync audit: compare local and remote digests for a whole tree.
//!
//! Every local file under `local_root` is paired with
//! `remote_root/<path relative to local_root>` and both digests are computed
//! concurrently. Workers pull pairs from a `crossbeam-channel` queue and send
//! back one record each; nothing is shared between them except the Transport.
//! Records are returned sorted by local path once every worker has joined.

use std::fmt;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::checksums::DigestOracle;
use crate::error::EngineError;
use crate::fs_ops::{Filesystem, LocalFilesystem};
use crate::paths;
use crate::transport::Transport;
use crate::walk::walk;

/// Verdict for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditStatus {
    /// Both digests present and equal
    Match,
    /// Both digests present, different
    Mismatch,
    /// Remote counterpart does not exist
    MissingRemote,
    /// One of the digests could not be computed
    Failed(String),
}

/// One local file and its remote counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub local_path: String,
    pub remote_path: String,
    pub status: AuditStatus,
}

impl AuditRecord {
    pub fn is_match(&self) -> bool {
        self.status == AuditStatus::Match
    }
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            AuditStatus::Match => {
                write!(f, "{} is the same as {}", self.local_path, self.remote_path)
            }
            AuditStatus::Mismatch => {
                write!(f, "{} is different from {}", self.local_path, self.remote_path)
            }
            AuditStatus::MissingRemote => {
                write!(f, "{} is missing at {}", self.local_path, self.remote_path)
            }
            AuditStatus::Failed(message) => {
                write!(f, "{} could not be checked: {}", self.local_path, message)
            }
        }
    }
}

/// All records of one audit, sorted by local path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub records: Vec<AuditRecord>,
}

impl AuditReport {
    /// True when every file matched (an empty tree is clean).
    pub fn is_clean(&self) -> bool {
        self.records.iter().all(AuditRecord::is_match)
    }

    /// Records that did not match, in path order.
    pub fn problems(&self) -> impl Iterator<Item = &AuditRecord> {
        self.records.iter().filter(|r| !r.is_match())
    }
}

/// Audit `local_root` against `remote_root`.
///
/// `workers = 0` starts one worker per file; `default_workers()` sizes the
/// pool to the machine instead. If the OS refuses to start a thread, the
/// workers already running take the rest of the queue. A local root that is a single
/// file is compared with `remote_root/<its base name>`.
///
/// # Errors
/// Only enumeration of the local tree is fatal. Per-file digest failures are
/// recorded as `AuditStatus::Failed`.
pub fn audit(
    transport: &dyn Transport,
    oracle: DigestOracle,
    local_root: &str,
    remote_root: &str,
    workers: usize,
) -> Result<AuditReport, EngineError> {
    let pairs = collect_pairs(oracle, local_root, remote_root)?;
    if pairs.is_empty() {
        return Ok(AuditReport::default());
    }

    let worker_count = if workers == 0 {
        pairs.len()
    } else {
        workers.min(pairs.len())
    };
    info!(
        "auditing {} file(s) with {} {} worker(s)",
        pairs.len(),
        worker_count,
        oracle.algorithm()
    );

    let (task_tx, task_rx) = unbounded::<(String, String)>();
    let (record_tx, record_rx) = unbounded::<AuditRecord>();
    for pair in pairs {
        if task_tx.send(pair).is_err() {
            break;
        }
    }
    drop(task_tx);

    let started = thread::scope(|scope| {
        let mut started = 0;
        for index in 0..worker_count {
            let task_rx = task_rx.clone();
            let record_tx = record_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("audit-{}", index))
                .spawn_scoped(scope, move || {
                    drain_tasks(transport, oracle, &task_rx, &record_tx)
                });
            match spawned {
                Ok(_) => started += 1,
                Err(e) => {
                    warn!("started only {} audit worker(s): {}", started, e);
                    break;
                }
            }
        }
        started
    });
    if started == 0 {
        drain_tasks(transport, oracle, &task_rx, &record_tx);
    }
    drop(record_tx);

    let mut records: Vec<AuditRecord> = record_rx.iter().collect();
    records.sort_by(|a, b| a.local_path.cmp(&b.local_path));
    Ok(AuditReport { records })
}

/// Worker count used when the caller does not pick one.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn drain_tasks(
    transport: &dyn Transport,
    oracle: DigestOracle,
    tasks: &Receiver<(String, String)>,
    records: &Sender<AuditRecord>,
) {
    for (local_path, remote_path) in tasks.iter() {
        let status = check_pair(transport, oracle, &local_path, &remote_path);
        let record = AuditRecord {
            local_path,
            remote_path,
            status,
        };
        if records.send(record).is_err() {
            break;
        }
    }
}

fn collect_pairs(
    oracle: DigestOracle,
    local_root: &str,
    remote_root: &str,
) -> Result<Vec<(String, String)>, EngineError> {
    let local = LocalFilesystem::new(oracle);
    let local_root = paths::normalize(local_root);
    let remote_root = paths::normalize(remote_root);

    let stat = local
        .stat(&local_root)?
        .ok_or_else(|| EngineError::SourceNotFound {
            path: local_root.clone(),
        })?;
    if !stat.is_dir {
        let remote = paths::join(&remote_root, paths::base_name(&local_root));
        return Ok(vec![(local_root, remote)]);
    }

    let mut pairs = Vec::new();
    for entry in walk(&local, &local_root) {
        let entry = entry?.sorted();
        let relative = paths::relative_to(&local_root, &entry.directory).unwrap_or_default();
        for file in &entry.files {
            let relative_file = paths::join(&relative, file);
            pairs.push((
                paths::join(&entry.directory, file),
                paths::join(&remote_root, &relative_file),
            ));
        }
    }
    Ok(pairs)
}

fn check_pair(
    transport: &dyn Transport,
    oracle: DigestOracle,
    local_path: &str,
    remote_path: &str,
) -> AuditStatus {
    let compared = oracle.local_digest(local_path).and_then(|local| {
        let remote = oracle.remote_digest(transport, remote_path)?;
        Ok((local, remote))
    });

    match compared {
        Ok((_, remote)) if remote.is_absent() => AuditStatus::MissingRemote,
        Ok((local, remote)) if local.confirms(&remote) => AuditStatus::Match,
        Ok((local, remote)) => {
            debug!("{}: local {} remote {}", local_path, local, remote);
            AuditStatus::Mismatch
        }
        Err(e) => AuditStatus::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_display() {
        let record = AuditRecord {
            local_path: "/data/a.txt".to_string(),
            remote_path: "/backup/a.txt".to_string(),
            status: AuditStatus::Mismatch,
        };
        assert_eq!(record.to_string(), "/data/a.txt is different from /backup/a.txt");
    }

    #[test]
    fn test_report_clean_and_problems() {
        let ok = AuditRecord {
            local_path: "a".to_string(),
            remote_path: "r/a".to_string(),
            status: AuditStatus::Match,
        };
        let missing = AuditRecord {
            local_path: "b".to_string(),
            remote_path: "r/b".to_string(),
            status: AuditStatus::MissingRemote,
        };

        assert!(AuditReport::default().is_clean());
        let report = AuditReport {
            records: vec![ok.clone(), missing.clone()],
        };
        assert!(!report.is_clean());
        assert_eq!(report.problems().collect::<Vec<_>>(), vec![&missing]);
    }

    #[test]
    fn test_default_workers_is_positive() {
        assert!(default_workers() >= 1);
    }

    #[test]
    fn test_collect_pairs_mirrors_relative_paths() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        std::fs::create_dir(root.join("sub")).expect("Failed to create subdir");
        std::fs::write(root.join("top.txt"), b"t").expect("Failed to write file");
        std::fs::write(root.join("sub").join("inner.txt"), b"i").expect("Failed to write file");

        let local_root = paths::normalize(&root.to_string_lossy());
        let pairs = collect_pairs(DigestOracle::default(), &local_root, "/remote/copy")
            .expect("collect should succeed");

        let remotes: Vec<&str> = pairs.iter().map(|(_, r)| r.as_str()).collect();
        assert_eq!(remotes, vec!["/remote/copy/top.txt", "/remote/copy/sub/inner.txt"]);
    }
}
