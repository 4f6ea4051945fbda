//! Archive helper: pack trees into `.tar.gz` files before a transfer and
//! unpack them afterwards.
//!
//! Packing shells out to `tar`, compressing with `pigz` when it is installed
//! and with tar's own gzip otherwise. An archive larger than the split size is
//! cut into equally sized parts `aa`, `ab`, ... inside `<archive>-split/` and
//! the unsplit archive removed. Unpacking a `-split` directory first concatenates its
//! parts, in name order, back into the archive named before `-split`.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Default part size when splitting large archives.
pub const DEFAULT_SPLIT_SIZE: &str = "2G";

const SPLIT_SUFFIX: &str = "-split";
const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Parse a size such as `512`, `64K`, `100M` or `2G` (powers of 1024).
pub fn parse_size(value: &str) -> Result<u64, String> {
    let value = value.trim();
    let (digits, multiplier) = match value.chars().last() {
        Some('K') | Some('k') => (&value[..value.len() - 1], 1024u64),
        Some('M') | Some('m') => (&value[..value.len() - 1], 1024 * 1024),
        Some('G') | Some('g') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };
    let count: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size '{}' (expected <n>[K|M|G])", value))?;
    let bytes = count
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{}' is too large", value))?;
    if bytes == 0 {
        return Err("size must be greater than zero".to_string());
    }
    Ok(bytes)
}

/// Packs and unpacks archives with `tar`.
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    split_size: u64,
    use_pigz: bool,
}

impl Compressor {
    /// New compressor; checks once whether `pigz` is installed.
    pub fn new(split_size: u64) -> Self {
        let use_pigz = pigz_available();
        if !use_pigz {
            warn!("pigz is not installed, falling back to gzip");
        }
        Compressor {
            split_size,
            use_pigz,
        }
    }

    /// Force `pigz` on or off.
    pub fn with_pigz(mut self, use_pigz: bool) -> Self {
        self.use_pigz = use_pigz;
        self
    }

    pub fn split_size(&self) -> u64 {
        self.split_size
    }

    /// Pack `src` into `dst_dir/<name>.tar.gz`, creating `dst_dir` if needed.
    ///
    /// Returns the archive path, or the `-split` directory when the archive
    /// was larger than the split size.
    pub fn compress(&self, src: &Path, dst_dir: &Path) -> Result<PathBuf, EngineError> {
        if !src.exists() {
            return Err(EngineError::SourceNotFound {
                path: src.display().to_string(),
            });
        }
        ensure_dir(dst_dir)?;

        let name = src.file_name().ok_or_else(|| EngineError::InvalidPath {
            path: src.display().to_string(),
            reason: "has no file name".to_string(),
        })?;
        let parent = match src.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let dst_dir = fs::canonicalize(dst_dir).map_err(io_error(dst_dir))?;
        let mut archive_name = name.to_os_string();
        archive_name.push(ARCHIVE_EXTENSION);
        let archive = dst_dir.join(archive_name);

        info!("Compressing {} to {}", src.display(), archive.display());
        let mut tar = Command::new("tar");
        tar.current_dir(parent);
        if self.use_pigz {
            tar.arg("--use-compress-program=pigz").arg("-cf");
        } else {
            tar.arg("-czf");
        }
        tar.arg(&archive).arg(name);
        run_tool(tar, "tar")?;

        let size = fs::metadata(&archive).map_err(io_error(&archive))?.len();
        if size > self.split_size {
            return split_file(&archive, self.split_size);
        }
        Ok(archive)
    }

    /// Unpack an archive, or a `-split` directory of parts, into `dst_dir`.
    pub fn decompress(&self, src: &Path, dst_dir: &Path) -> Result<(), EngineError> {
        if !src.exists() {
            return Err(EngineError::SourceNotFound {
                path: src.display().to_string(),
            });
        }
        ensure_dir(dst_dir)?;

        let archive = if src.is_dir() {
            merge_parts(src)?
        } else {
            src.to_path_buf()
        };

        info!("Decompressing {} to {}", archive.display(), dst_dir.display());
        let mut tar = Command::new("tar");
        if self.use_pigz {
            tar.arg("--use-compress-program=pigz").arg("-xf");
        } else {
            tar.arg("-xzf");
        }
        tar.arg(&archive).arg("-C").arg(dst_dir);
        run_tool(tar, "tar")
    }

    /// Pack every entry of `root`, in name order.
    pub fn compress_root(&self, root: &Path, dst_dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
        sorted_entries(root)?
            .iter()
            .map(|entry| self.compress(entry, dst_dir))
            .collect()
    }

    /// Unpack every entry of `root`, in name order.
    pub fn decompress_root(&self, root: &Path, dst_dir: &Path) -> Result<(), EngineError> {
        for entry in sorted_entries(root)? {
            self.decompress(&entry, dst_dir)?;
        }
        Ok(())
    }
}

/// Cut `path` into parts of `part_size` bytes inside `<path>-split/` and
/// remove `path`. Returns the split directory.
pub fn split_file(path: &Path, part_size: u64) -> Result<PathBuf, EngineError> {
    if part_size == 0 {
        return Err(EngineError::InvalidPath {
            path: path.display().to_string(),
            reason: "part size must be greater than zero".to_string(),
        });
    }
    let size = fs::metadata(path).map_err(io_error(path))?.len();
    let parts = size.div_ceil(part_size).max(1);
    let width = suffix_width(parts);

    let mut split_name: OsString = path.as_os_str().to_os_string();
    split_name.push(SPLIT_SUFFIX);
    let split_dir = PathBuf::from(split_name);
    ensure_dir(&split_dir)?;

    info!("Splitting {} into {} part(s)", path.display(), parts);
    let mut reader = BufReader::new(File::open(path).map_err(io_error(path))?);
    for index in 0..parts {
        let part_path = split_dir.join(part_name(index, width));
        let mut writer = BufWriter::new(File::create(&part_path).map_err(io_error(&part_path))?);
        io::copy(&mut reader.by_ref().take(part_size), &mut writer)
            .map_err(io_error(&part_path))?;
        writer.flush().map_err(io_error(&part_path))?;
    }
    drop(reader);

    fs::remove_file(path).map_err(io_error(path))?;
    Ok(split_dir)
}

/// Concatenate the parts in a `-split` directory into the archive next to it.
///
/// `/out/data.tar.gz-split/` becomes `/out/data.tar.gz`.
pub fn merge_parts(split_dir: &Path) -> Result<PathBuf, EngineError> {
    let dir_name = split_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let archive_name = dir_name
        .strip_suffix(SPLIT_SUFFIX)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| EngineError::InvalidPath {
            path: split_dir.display().to_string(),
            reason: format!("directory name does not end with '{}'", SPLIT_SUFFIX),
        })?;
    let merged = split_dir.with_file_name(archive_name);

    info!("Merging {} into {}", split_dir.display(), merged.display());
    let mut writer = BufWriter::new(File::create(&merged).map_err(io_error(&merged))?);
    for part in sorted_entries(split_dir)? {
        if !part.is_file() {
            continue;
        }
        debug!("appending {}", part.display());
        let mut reader = File::open(&part).map_err(io_error(&part))?;
        io::copy(&mut reader, &mut writer).map_err(io_error(&merged))?;
    }
    writer.flush().map_err(io_error(&merged))?;
    Ok(merged)
}

/// Part name for `index` using `width` lowercase letters: `aa`, `ab`, ...
fn part_name(index: u64, width: u32) -> String {
    (0..width)
        .rev()
        .map(|position| {
            let digit = (index / 26u64.pow(position)) % 26;
            char::from(b'a' + digit as u8)
        })
        .collect()
}

/// Smallest suffix width (at least two letters) that names `parts` parts.
fn suffix_width(parts: u64) -> u32 {
    let mut width = 2;
    while 26u64.saturating_pow(width) < parts {
        width += 1;
    }
    width
}

fn pigz_available() -> bool {
    Command::new("pigz").arg("--version").output().is_ok()
}

fn run_tool(mut command: Command, program: &str) -> Result<(), EngineError> {
    debug!("running {:?}", command);
    let output = command.output().map_err(|e| EngineError::ExternalCommand {
        program: program.to_string(),
        message: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(EngineError::ExternalCommand {
            program: program.to_string(),
            message: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<(), EngineError> {
    if path.is_dir() {
        return Ok(());
    }
    info!("Output directory {} does not exist, creating it", path.display());
    fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreationFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let enumeration_error = |e: io::Error| EngineError::EnumerationFailed {
        path: dir.display().to_string(),
        message: e.to_string(),
    };
    let mut entries = fs::read_dir(dir)
        .map_err(enumeration_error)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(enumeration_error)?;
    entries.sort();
    Ok(entries)
}

fn io_error(path: &Path) -> impl Fn(io::Error) -> EngineError + '_ {
    move |e| EngineError::local_io(path.display().to_string(), e)
}
