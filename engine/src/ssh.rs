//! SSH/SFTP implementation of `Transport`, backed by libssh2 (`ssh2` crate).

use std::fs::File;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use ssh2::{ErrorCode, Session, Sftp};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::EngineError;
use crate::model::{DirEntry, FileStat};
use crate::transport::{TransferProgress, Transport};

const CHUNK_SIZE: usize = 32 * 1024;

/// SFTP status code for a missing path.
const LIBSSH2_FX_NO_SUCH_FILE: i32 = 2;

const DEFAULT_DIR_MODE: i32 = 0o755;

struct Connection {
    session: Session,
    sftp: Sftp,
}

/// An authenticated SSH session with an open SFTP channel.
///
/// libssh2 sessions are not safe to drive from two threads at once, so the
/// session and its SFTP handle sit behind one mutex and every call holds it
/// for its whole duration.
pub struct SshTransport {
    inner: Mutex<Connection>,
}

impl SshTransport {
    /// Connect, handshake and authenticate.
    ///
    /// Uses password authentication when `config.password` is set and the
    /// running ssh-agent otherwise.
    pub fn connect(config: &ConnectionConfig) -> Result<Self, EngineError> {
        let address = config.address();
        let connection_error = |message: String| EngineError::Connection {
            address: address.clone(),
            message,
        };

        let tcp = TcpStream::connect(&address).map_err(|e| connection_error(e.to_string()))?;
        let mut session = Session::new().map_err(|e| connection_error(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| connection_error(format!("SSH handshake failed: {}", e)))?;

        let auth_result = match &config.password {
            Some(password) => session.userauth_password(&config.username, password),
            None => session.userauth_agent(&config.username),
        };
        if let Err(e) = auth_result {
            debug!("authentication error for {}: {}", config.username, e);
        }
        if !session.authenticated() {
            return Err(EngineError::Authentication {
                username: config.username.clone(),
                address: address.clone(),
            });
        }

        let sftp = session
            .sftp()
            .map_err(|e| connection_error(format!("cannot open SFTP channel: {}", e)))?;

        info!("connected to {} as {}", address, config.username);
        Ok(SshTransport {
            inner: Mutex::new(Connection { session, sftp }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn is_not_found(error: &ssh2::Error) -> bool {
    matches!(error.code(), ErrorCode::SFTP(LIBSSH2_FX_NO_SUCH_FILE))
}

fn to_file_stat(stat: &ssh2::FileStat) -> FileStat {
    FileStat {
        is_dir: stat.is_dir(),
        size: stat.size.unwrap_or(0),
        mtime: stat.mtime,
    }
}

/// Turn a readdir listing into entries, dropping `.` and `..`.
///
/// readdir carries lstat attributes, so each symlink is resolved with
/// `follow` (a stat) and classified by its target. Broken links are skipped.
fn classify_listing<F>(
    path: &str,
    listing: Vec<(PathBuf, ssh2::FileStat)>,
    mut follow: F,
) -> Result<Vec<DirEntry>, EngineError>
where
    F: FnMut(&Path) -> Result<ssh2::FileStat, ssh2::Error>,
{
    let mut entries = Vec::with_capacity(listing.len());
    for (entry_path, stat) in listing {
        // Path::file_name would turn a trailing "." into the parent's name.
        let raw = entry_path.to_string_lossy();
        let name = match raw.rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };
        if name == "." || name == ".." {
            continue;
        }

        let stat = if stat.file_type().is_symlink() {
            match follow(&entry_path) {
                Ok(target) => target,
                Err(e) if is_not_found(&e) => {
                    debug!("skipping broken remote symlink {}", entry_path.display());
                    continue;
                }
                Err(e) => {
                    return Err(EngineError::EnumerationFailed {
                        path: path.to_string(),
                        message: e.to_string(),
                    })
                }
            }
        } else {
            stat
        };

        entries.push(DirEntry {
            name,
            stat: to_file_stat(&stat),
        });
    }
    Ok(entries)
}

/// Copy the remote mtime onto a downloaded file. Failure only costs the
/// timestamp, so it is logged and reported as `false`.
fn restore_local_mtime(local_path: &Path, mtime: u64) -> bool {
    let time = filetime::FileTime::from_unix_time(mtime as i64, 0);
    match filetime::set_file_mtime(local_path, time) {
        Ok(()) => true,
        Err(e) => {
            debug!("could not set local mtime on {}: {}", local_path.display(), e);
            false
        }
    }
}

fn times_only(mtime: u64) -> ssh2::FileStat {
    ssh2::FileStat {
        size: None,
        uid: None,
        gid: None,
        perm: None,
        atime: Some(mtime),
        mtime: Some(mtime),
    }
}

impl Transport for SshTransport {
    fn execute(&self, command: &str) -> Result<String, EngineError> {
        let conn = self.lock();
        let command_error = |message: String| EngineError::RemoteCommand {
            command: command.to_string(),
            message,
        };

        let mut channel = conn
            .session
            .channel_session()
            .map_err(|e| command_error(e.to_string()))?;
        channel.exec(command).map_err(|e| command_error(e.to_string()))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| command_error(e.to_string()))?;
        let mut stderr = String::new();
        if let Err(e) = channel.stderr().read_to_string(&mut stderr) {
            debug!("could not read stderr of `{}`: {}", command, e);
        }
        channel.wait_close().map_err(|e| command_error(e.to_string()))?;

        let status = channel
            .exit_status()
            .map_err(|e| command_error(e.to_string()))?;
        if status != 0 {
            return Err(command_error(format!(
                "exit status {}: {}",
                status,
                stderr.trim()
            )));
        }

        debug!("remote command `{}` succeeded", command);
        Ok(stdout)
    }

    fn stat(&self, path: &str) -> Result<Option<FileStat>, EngineError> {
        let conn = self.lock();
        match conn.sftp.stat(Path::new(path)) {
            Ok(stat) => Ok(Some(to_file_stat(&stat))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(EngineError::remote(path, e)),
        }
    }

    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, EngineError> {
        let conn = self.lock();
        let listing = conn
            .sftp
            .readdir(Path::new(path))
            .map_err(|e| EngineError::EnumerationFailed {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        classify_listing(path, listing, |entry_path| conn.sftp.stat(entry_path))
    }

    fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: TransferProgress<'_>,
    ) -> Result<u64, EngineError> {
        let local_name = local_path.to_string_lossy();
        let mut local = File::open(local_path).map_err(|e| EngineError::local_io(&*local_name, e))?;
        let metadata = local
            .metadata()
            .map_err(|e| EngineError::local_io(&*local_name, e))?;
        let total = metadata.len();
        let mtime = filetime::FileTime::from_last_modification_time(&metadata).unix_seconds();

        let conn = self.lock();
        let mut remote = conn
            .sftp
            .create(Path::new(remote_path))
            .map_err(|e| EngineError::remote(remote_path, e))?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut sent = 0u64;
        loop {
            let n = local
                .read(&mut buffer)
                .map_err(|e| EngineError::local_io(&*local_name, e))?;
            if n == 0 {
                break;
            }
            remote
                .write_all(&buffer[..n])
                .map_err(|e| EngineError::remote(remote_path, e))?;
            sent += n as u64;
            progress(sent, total);
            let _ = conn.session.keepalive_send();
        }
        drop(remote);

        if mtime >= 0 {
            if let Err(e) = conn
                .sftp
                .setstat(Path::new(remote_path), times_only(mtime as u64))
            {
                debug!("could not set remote mtime on {}: {}", remote_path, e);
            }
        }

        Ok(sent)
    }

    fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: TransferProgress<'_>,
    ) -> Result<u64, EngineError> {
        let local_name = local_path.to_string_lossy();
        let conn = self.lock();

        let stat = conn
            .sftp
            .stat(Path::new(remote_path))
            .map_err(|e| EngineError::remote(remote_path, e))?;
        let total = stat.size.unwrap_or(0);
        let mut remote = conn
            .sftp
            .open(Path::new(remote_path))
            .map_err(|e| EngineError::remote(remote_path, e))?;
        let mut local =
            File::create(local_path).map_err(|e| EngineError::local_io(&*local_name, e))?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut received = 0u64;
        loop {
            let n = remote
                .read(&mut buffer)
                .map_err(|e| EngineError::remote(remote_path, e))?;
            if n == 0 {
                break;
            }
            local
                .write_all(&buffer[..n])
                .map_err(|e| EngineError::local_io(&*local_name, e))?;
            received += n as u64;
            progress(received, total);
            let _ = conn.session.keepalive_send();
        }
        local
            .flush()
            .map_err(|e| EngineError::local_io(&*local_name, e))?;
        drop(local);

        if let Some(mtime) = stat.mtime {
            restore_local_mtime(local_path, mtime);
        }

        Ok(received)
    }

    fn make_directory(&self, path: &str) -> Result<(), EngineError> {
        let conn = self.lock();
        let creation_error = |message: String| EngineError::DirectoryCreationFailed {
            path: path.to_string(),
            message,
        };

        match conn.sftp.stat(Path::new(path)) {
            Ok(stat) if stat.is_dir() => return Ok(()),
            Ok(_) => return Err(creation_error("path exists and is not a directory".to_string())),
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(creation_error(e.to_string())),
        }

        conn.sftp
            .mkdir(Path::new(path), DEFAULT_DIR_MODE)
            .map_err(|e| creation_error(e.to_string()))?;
        debug!("created remote directory {}", path);
        Ok(())
    }

    fn set_keepalive(&self, interval_secs: u32) {
        self.lock().session.set_keepalive(true, interval_secs);
    }
}
