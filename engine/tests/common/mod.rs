//! Shared test doubles: an in-process "remote host" and a recording callback.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use syncengine::checksums::compute_file_checksum;
use syncengine::transport::TransferProgress;
use syncengine::{
    ChecksumAlgorithm, DirEntry, EngineError, FileOutcome, FileStat, ProgressCallback,
    ProgressSample, ResendReason, TransferJob, Transport,
};

const CHUNK: usize = 1024;

/// A `Transport` whose remote filesystem is a temporary directory.
///
/// Remote path `/backup/a.txt` lives at `<tempdir>/backup/a.txt`. Digest
/// commands are answered in-process in the `md5sum` output format, and the
/// next N uploads or downloads can be made to deliver corrupted bytes.
pub struct MockTransport {
    root: tempfile::TempDir,
    corrupt_uploads: AtomicU32,
    corrupt_downloads: AtomicU32,
    uploads: AtomicU32,
    downloads: AtomicU32,
    keepalive: AtomicU32,
    commands: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            root: tempfile::tempdir().expect("Failed to create remote temp dir"),
            corrupt_uploads: AtomicU32::new(0),
            corrupt_downloads: AtomicU32::new(0),
            uploads: AtomicU32::new(0),
            downloads: AtomicU32::new(0),
            keepalive: AtomicU32::new(0),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Corrupt the next `count` uploads.
    pub fn corrupt_next_uploads(&self, count: u32) {
        self.corrupt_uploads.store(count, Ordering::SeqCst);
    }

    /// Corrupt the next `count` downloads.
    pub fn corrupt_next_downloads(&self, count: u32) {
        self.corrupt_downloads.store(count, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> u32 {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> u32 {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn keepalive(&self) -> u32 {
        self.keepalive.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Where a remote path lives on disk.
    pub fn backing_path(&self, remote: &str) -> PathBuf {
        let relative = remote.trim_start_matches('/');
        if relative.is_empty() {
            self.root.path().to_path_buf()
        } else {
            self.root.path().join(relative)
        }
    }

    /// Put a file on the "remote host", creating parents.
    pub fn write_remote(&self, remote: &str, content: &[u8]) {
        let path = self.backing_path(remote);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create remote parent");
        }
        fs::write(path, content).expect("Failed to write remote file");
    }

    pub fn read_remote(&self, remote: &str) -> Vec<u8> {
        fs::read(self.backing_path(remote)).expect("Failed to read remote file")
    }

    pub fn remote_exists(&self, remote: &str) -> bool {
        self.backing_path(remote).exists()
    }

    fn take_corruption(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn unquote(quoted: &str) -> String {
    let inner = quoted
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(quoted);
    inner.replace("'\\''", "'")
}

/// Copy `from` to `to` in chunks, reporting progress, optionally flipping a byte.
fn copy_with_progress(
    from: &Path,
    to: &Path,
    corrupt: bool,
    progress: TransferProgress<'_>,
) -> std::io::Result<u64> {
    let mut data = fs::read(from)?;
    if corrupt {
        match data.first_mut() {
            Some(byte) => *byte ^= 0xFF,
            None => data.push(0),
        }
    }

    let total = data.len() as u64;
    let mut out = fs::File::create(to)?;
    let mut sent = 0u64;
    for chunk in data.chunks(CHUNK) {
        out.write_all(chunk)?;
        sent += chunk.len() as u64;
        progress(sent, total);
    }
    out.flush()?;
    Ok(sent)
}

impl Transport for MockTransport {
    fn execute(&self, command: &str) -> Result<String, EngineError> {
        self.commands.lock().unwrap().push(command.to_string());
        let failed = |message: &str| EngineError::RemoteCommand {
            command: command.to_string(),
            message: message.to_string(),
        };

        let (tool, quoted) = command
            .split_once(" -- ")
            .ok_or_else(|| failed("unsupported command"))?;
        let algorithm = match tool {
            "md5sum" => ChecksumAlgorithm::Md5,
            "sha256sum" => ChecksumAlgorithm::Sha256,
            "b3sum" => ChecksumAlgorithm::Blake3,
            _ => return Err(failed("command not found")),
        };

        let remote = unquote(quoted);
        let backing = self.backing_path(&remote);
        let hex = compute_file_checksum(&backing.to_string_lossy(), algorithm)
            .map_err(|_| failed("No such file or directory"))?;
        Ok(format!("{}  {}\n", hex, remote))
    }

    fn stat(&self, path: &str) -> Result<Option<FileStat>, EngineError> {
        match fs::metadata(self.backing_path(path)) {
            Ok(m) if m.is_dir() => Ok(Some(FileStat::directory())),
            Ok(m) => Ok(Some(FileStat::file(m.len()))),
            Err(_) => Ok(None),
        }
    }

    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, EngineError> {
        let listing = fs::read_dir(self.backing_path(path)).map_err(|e| {
            EngineError::EnumerationFailed {
                path: path.to_string(),
                message: e.to_string(),
            }
        })?;

        let mut entries = Vec::new();
        for entry in listing {
            let entry = entry.map_err(|e| EngineError::remote(path, e))?;
            // readdir reports lstat attributes; links are resolved with a stat.
            let mut metadata = entry.metadata().map_err(|e| EngineError::remote(path, e))?;
            if metadata.file_type().is_symlink() {
                match fs::metadata(entry.path()) {
                    Ok(target) => metadata = target,
                    Err(_) => continue,
                }
            }
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                stat: if metadata.is_dir() {
                    FileStat::directory()
                } else {
                    FileStat::file(metadata.len())
                },
            });
        }
        // Reverse name order, so callers cannot rely on listing order.
        entries.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(entries)
    }

    fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: TransferProgress<'_>,
    ) -> Result<u64, EngineError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let corrupt = Self::take_corruption(&self.corrupt_uploads);
        copy_with_progress(local_path, &self.backing_path(remote_path), corrupt, progress)
            .map_err(|e| EngineError::remote(remote_path, e))
    }

    fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: TransferProgress<'_>,
    ) -> Result<u64, EngineError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let corrupt = Self::take_corruption(&self.corrupt_downloads);
        copy_with_progress(&self.backing_path(remote_path), local_path, corrupt, progress)
            .map_err(|e| EngineError::local_io(local_path.to_string_lossy(), e))
    }

    fn make_directory(&self, path: &str) -> Result<(), EngineError> {
        let backing = self.backing_path(path);
        if backing.is_dir() {
            return Ok(());
        }
        fs::create_dir(&backing).map_err(|e| EngineError::DirectoryCreationFailed {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    fn set_keepalive(&self, interval_secs: u32) {
        self.keepalive.store(interval_secs, Ordering::SeqCst);
    }
}

/// Records every callback as a short string, in call order.
pub struct TestProgressCallback {
    calls: Mutex<Vec<String>>,
}

impl TestProgressCallback {
    pub fn new() -> Self {
        TestProgressCallback {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.get_calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl ProgressCallback for TestProgressCallback {
    fn on_file_started(&self, job: &TransferJob) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("started({})", job.file_name()));
    }

    fn on_file_progress(&self, job: &TransferJob, _sample: &ProgressSample) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("progress({})", job.file_name()));
    }

    fn on_resend(&self, job: &TransferJob, reason: ResendReason) {
        let reason = match reason {
            ResendReason::DestinationDiffers => "differs".to_string(),
            ResendReason::VerificationFailed { attempt } => format!("verify {}", attempt),
        };
        self.calls
            .lock()
            .unwrap()
            .push(format!("resend({}, {})", job.file_name(), reason));
    }

    fn on_file_completed(&self, job: &TransferJob, outcome: &FileOutcome) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("completed({}, {})", job.file_name(), outcome.attempts));
    }
}

/// Normalized string form of a local path.
pub fn path_str(path: &Path) -> String {
    syncengine::paths::normalize(&path.to_string_lossy())
}
