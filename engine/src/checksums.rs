//! Checksum oracle.
//!
//! This module provides:
//! - The supported digest algorithms and the command-line tool for each
//! - In-process file digests for the local endpoint
//! - Remote digests through the Transport, with "absent" for missing paths
//!
//! Local digests are computed with the same algorithm the remote tool uses and
//! rendered as lowercase hex, which is exactly the first token `md5sum`,
//! `sha256sum` and `b3sum` print. Digests from both ends therefore compare by
//! plain string equality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::str::FromStr;

use crate::error::EngineError;
use crate::paths;
use crate::transport::Transport;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5, what `md5sum` prints
    #[default]
    Md5,
    /// SHA-256, what `sha256sum` prints
    Sha256,
    /// BLAKE3, what `b3sum` prints
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!(
                "unknown checksum algorithm '{}' (expected md5, sha256 or blake3)",
                other
            )),
        }
    }
}

impl ChecksumAlgorithm {
    /// Remote command-line tool whose first output token is the digest.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Md5 => "md5sum",
            Self::Sha256 => "sha256sum",
            Self::Blake3 => "b3sum",
        }
    }
}

/// Content digest of one path, or the marker for a path that does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Digest {
    /// Hex digest string as printed by the digest tool
    Value(String),
    /// Path does not exist (yet)
    Absent,
}

impl Digest {
    pub fn is_absent(&self) -> bool {
        matches!(self, Digest::Absent)
    }

    /// True only when both sides hold the same, non-absent digest.
    pub fn confirms(&self, other: &Digest) -> bool {
        match (self, other) {
            (Digest::Value(a), Digest::Value(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Digest::Value(hex) => write!(f, "{}", hex),
            Digest::Absent => write!(f, "(absent)"),
        }
    }
}

/// Trait for computing checksums
pub trait ChecksumHasher {
    /// Update the hasher with new data
    fn update(&mut self, data: &[u8]);

    /// Finalize and return the lowercase hex digest
    fn finalize(self: Box<Self>) -> String;
}

/// MD5 hasher (backed by md5 crate)
struct Md5Hasher {
    context: md5::Context,
}

impl ChecksumHasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn finalize(self: Box<Self>) -> String {
        format!("{:x}", self.context.compute())
    }
}

/// SHA-256 hasher (backed by sha2 crate)
struct Sha256Hasher {
    hasher: sha2::Sha256,
}

impl ChecksumHasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> String {
        use sha2::Digest;
        format!("{:x}", self.hasher.finalize())
    }
}

/// BLAKE3 hasher (backed by blake3 crate)
struct Blake3Hasher {
    hasher: blake3::Hasher,
}

impl ChecksumHasher for Blake3Hasher {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

/// Create a new hasher for the given algorithm
pub fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Md5 => Box::new(Md5Hasher {
            context: md5::Context::new(),
        }),
        ChecksumAlgorithm::Sha256 => Box::new(Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }),
        ChecksumAlgorithm::Blake3 => Box::new(Blake3Hasher {
            hasher: blake3::Hasher::new(),
        }),
    }
}

/// Compute the hex digest of a whole local file.
pub fn compute_file_checksum(
    path: &str,
    algorithm: ChecksumAlgorithm,
) -> Result<String, EngineError> {
    let mut file = File::open(path).map_err(|e| EngineError::local_io(path, e))?;
    let mut hasher = create_hasher(algorithm);
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| EngineError::local_io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Extract the digest from a digest tool's output: its first whitespace token.
///
/// GNU coreutils prefix the line with `\` when the file name needed escaping;
/// that marker is not part of the digest.
pub fn parse_digest_output(output: &str) -> Option<String> {
    let token = output.split_whitespace().next()?;
    let token = token.strip_prefix('\\').unwrap_or(token);
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Computes digests for local and remote paths with one algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigestOracle {
    algorithm: ChecksumAlgorithm,
}

impl DigestOracle {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        DigestOracle { algorithm }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Digest of a local file. An unreadable path is a fatal error.
    pub fn local_digest(&self, path: &str) -> Result<Digest, EngineError> {
        compute_file_checksum(path, self.algorithm).map(Digest::Value)
    }

    /// Shell command that prints the digest of a remote path.
    pub fn remote_command(&self, path: &str) -> String {
        format!("{} -- {}", self.algorithm.command(), paths::shell_quote(path))
    }

    /// Digest of a remote file, or `Digest::Absent` when it does not exist.
    pub fn remote_digest(
        &self,
        transport: &dyn Transport,
        path: &str,
    ) -> Result<Digest, EngineError> {
        if transport.stat(path)?.is_none() {
            return Ok(Digest::Absent);
        }

        let command = self.remote_command(path);
        let output = transport.execute(&command)?;
        parse_digest_output(&output)
            .map(Digest::Value)
            .ok_or_else(|| EngineError::RemoteCommand {
                command,
                message: "digest tool produced no output".to_string(),
            })
    }
}
