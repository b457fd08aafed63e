use std::fs;
use std::path::{Path, PathBuf};

use custody_store::{RetryPolicy, SyncMode};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Settings for a file-backed ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory holding the block log and the writer key.
    pub data_dir: PathBuf,
    /// Block log file name, relative to `data_dir` unless absolute.
    pub log_file: PathBuf,
    /// Writer key file name, relative to `data_dir` unless absolute.
    pub key_file: PathBuf,
    /// Number of trailing block hashes (including the new one) covered by
    /// each block's Merkle root. Fixed for the lifetime of a ledger.
    pub merkle_window: usize,
    pub sync_mode: SyncMode,
    pub retry: RetryPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_file: PathBuf::from("ledger.ndjson"),
            key_file: PathBuf::from("writer.key"),
            merkle_window: 10,
            sync_mode: SyncMode::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl LedgerConfig {
    /// Default settings rooted at `data_dir`.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file)
    }

    pub fn key_path(&self) -> PathBuf {
        self.data_dir.join(&self.key_file)
    }

    /// Parse from TOML text and check the result.
    pub fn from_toml_str(text: &str) -> Result<Self, LedgerError> {
        let config: Self = toml::from_str(text).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, LedgerError> {
        let text = fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Reject settings the ledger cannot run with.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.merkle_window == 0 {
            return Err(LedgerError::Config("merkle_window must be at least 1".into()));
        }
        if self.log_file.as_os_str().is_empty() {
            return Err(LedgerError::Config("log_file must not be empty".into()));
        }
        if self.key_file.as_os_str().is_empty() {
            return Err(LedgerError::Config("key_file must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = LedgerConfig::default();
        assert_eq!(c.merkle_window, 10);
        assert_eq!(c.sync_mode, SyncMode::EveryWrite);
        assert_eq!(c.retry.max_attempts, 3);
        assert_eq!(c.log_path(), PathBuf::from("data/ledger.ndjson"));
        assert_eq!(c.key_path(), PathBuf::from("data/writer.key"));
    }

    #[test]
    fn parses_partial_toml() {
        let c = LedgerConfig::from_toml_str(
            r#"
            data_dir = "/var/lib/custody"
            merkle_window = 4
            sync_mode = "os_default"

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(c.data_dir, PathBuf::from("/var/lib/custody"));
        assert_eq!(c.merkle_window, 4);
        assert_eq!(c.sync_mode, SyncMode::OsDefault);
        assert_eq!(c.retry.max_attempts, 5);
        assert_eq!(c.retry.max_delay_ms, 200);
        assert_eq!(c.log_file, PathBuf::from("ledger.ndjson"));
    }

    #[test]
    fn zero_window_is_rejected() {
        let err = LedgerConfig::from_toml_str("merkle_window = 0").unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn unknown_sync_mode_is_rejected() {
        assert!(LedgerConfig::from_toml_str(r#"sync_mode = "sometimes""#).is_err());
    }

    #[test]
    fn absolute_log_file_overrides_data_dir() {
        let c = LedgerConfig {
            log_file: PathBuf::from("/tmp/custom.ndjson"),
            ..LedgerConfig::in_dir("/data")
        };
        assert_eq!(c.log_path(), PathBuf::from("/tmp/custom.ndjson"));
    }
}
