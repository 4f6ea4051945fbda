//! Connection parameters and engine options.
//!
//! A run is configured from an optional JSON file plus command-line flags.
//! The file is a flat record of connection parameters with an optional
//! `"sync"` section:
//!
//! ```json
//! {
//!   "host": "backup.example.org",
//!   "port": 22,
//!   "username": "archive",
//!   "password": "hunter2",
//!   "sync": { "algorithm": "sha256", "keepalive_secs": 30 }
//! }
//! ```
//!
//! Flags always win over file values.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::checksums::ChecksumAlgorithm;
use crate::error::EngineError;
use crate::job::RetryPolicy;

pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_KEEPALIVE_SECS: u32 = 30;

/// Everything needed to open a Transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Password authentication when set, ssh-agent otherwise
    pub password: Option<String>,
}

impl ConnectionConfig {
    /// `host:port` string for TCP connect.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Engine behaviour knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Digest algorithm for verification
    pub algorithm: ChecksumAlgorithm,
    /// Keepalive interval applied at the start of every job (0 disables)
    pub keepalive_secs: u32,
    /// Skip the transfer when the destination already has the source digest
    pub skip_unchanged: bool,
    /// What to do when verification keeps failing
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            algorithm: ChecksumAlgorithm::default(),
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
            skip_unchanged: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// Contents of a `--config` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConfigFile {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub sync: SyncOptions,
    #[serde(skip)]
    source: Option<PathBuf>,
}

/// Connection values given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConfigFile {
    /// Read and parse a JSON config file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path).map_err(|e| EngineError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut config: ConfigFile =
            serde_json::from_str(&content).map_err(|e| EngineError::Config {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Merge command-line overrides on top of this file.
    ///
    /// Host and username are required from one of the two sources.
    pub fn connection(
        &self,
        overrides: &ConnectionOverrides,
    ) -> Result<ConnectionConfig, EngineError> {
        let missing = |field: &str| EngineError::Config {
            path: self
                .source
                .clone()
                .unwrap_or_else(|| PathBuf::from("<command line>")),
            message: format!("missing required connection parameter '{}'", field),
        };

        let host = overrides
            .host
            .clone()
            .or_else(|| self.host.clone())
            .ok_or_else(|| missing("host"))?;
        let username = overrides
            .username
            .clone()
            .or_else(|| self.username.clone())
            .ok_or_else(|| missing("username"))?;

        Ok(ConnectionConfig {
            host,
            port: overrides.port.or(self.port).unwrap_or(DEFAULT_PORT),
            username,
            password: overrides.password.clone().or_else(|| self.password.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("remote.json");
        fs::write(
            &path,
            r#"{"host": "10.0.0.5", "port": 2222, "username": "bob", "password": "pw"}"#,
        )
        .expect("Failed to write config");

        let config = ConfigFile::load(&path).expect("Config should parse");
        let connection = config
            .connection(&ConnectionOverrides::default())
            .expect("Connection should resolve");

        assert_eq!(connection.address(), "10.0.0.5:2222");
        assert_eq!(connection.username, "bob");
        assert_eq!(connection.password.as_deref(), Some("pw"));
        assert_eq!(config.sync, SyncOptions::default());
    }

    #[test]
    fn test_sync_section_overrides_defaults() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("remote.json");
        fs::write(
            &path,
            r#"{"host": "h", "username": "u",
                "sync": {"algorithm": "blake3", "skip_unchanged": false,
                         "retry": {"max_attempts": null}}}"#,
        )
        .expect("Failed to write config");

        let config = ConfigFile::load(&path).expect("Config should parse");
        assert_eq!(config.sync.algorithm, ChecksumAlgorithm::Blake3);
        assert!(!config.sync.skip_unchanged);
        assert_eq!(config.sync.keepalive_secs, DEFAULT_KEEPALIVE_SECS);
        assert_eq!(config.sync.retry.max_attempts, None);
    }

    #[test]
    fn test_flags_override_file() {
        let file = ConfigFile {
            host: Some("file-host".to_string()),
            port: Some(2022),
            username: Some("file-user".to_string()),
            password: Some("file-pw".to_string()),
            ..ConfigFile::default()
        };
        let overrides = ConnectionOverrides {
            host: Some("flag-host".to_string()),
            password: Some("flag-pw".to_string()),
            ..ConnectionOverrides::default()
        };

        let connection = file.connection(&overrides).expect("Connection should resolve");
        assert_eq!(connection.host, "flag-host");
        assert_eq!(connection.port, 2022);
        assert_eq!(connection.username, "file-user");
        assert_eq!(connection.password.as_deref(), Some("flag-pw"));
    }

    #[test]
    fn test_missing_host_is_config_error() {
        let overrides = ConnectionOverrides {
            username: Some("u".to_string()),
            ..ConnectionOverrides::default()
        };
        let result = ConfigFile::default().connection(&overrides);
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{ host: ").expect("Failed to write config");
        assert!(matches!(
            ConfigFile::load(&path),
            Err(EngineError::Config { .. })
        ));
    }
}
