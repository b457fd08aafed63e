use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use custody_ledger::LedgerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Page size used by `/v1/chain` when the caller gives no `limit`.
    pub default_page_size: usize,
    /// Upper bound on any `/v1/chain` page.
    pub max_page_size: usize,
    pub ledger: LedgerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 7878)),
            default_page_size: 100,
            max_page_size: 1000,
            ledger: LedgerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config
            .ledger
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        if config.max_page_size == 0 {
            return Err(ServerError::Config("max_page_size must be at least 1".into()));
        }
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> ServerResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:7878".parse::<SocketAddr>().unwrap());
        assert_eq!(c.default_page_size, 100);
        assert_eq!(c.max_page_size, 1000);
        assert_eq!(c.ledger.merkle_window, 10);
    }

    #[test]
    fn nested_ledger_table() {
        let c = ServerConfig::from_toml_str(
            r#"
            bind_addr = "0.0.0.0:9000"
            max_page_size = 50

            [ledger]
            data_dir = "/srv/custody"
            merkle_window = 16
            "#,
        )
        .unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert_eq!(c.max_page_size, 50);
        assert_eq!(c.ledger.data_dir, PathBuf::from("/srv/custody"));
        assert_eq!(c.ledger.merkle_window, 16);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(ServerConfig::from_toml_str("max_page_size = 0").is_err());
        assert!(ServerConfig::from_toml_str("[ledger]\nmerkle_window = 0").is_err());
        assert!(ServerConfig::from_toml_str(r#"bind_addr = "nowhere""#).is_err());
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custody.toml");
        fs::write(&path, "default_page_size = 25\n").unwrap();
        assert_eq!(ServerConfig::from_toml_file(&path).unwrap().default_page_size, 25);
        assert!(ServerConfig::from_toml_file(&dir.path().join("missing.toml")).is_err());
    }
}
