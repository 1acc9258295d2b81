//! Configuration management for PixLedger

use crate::blockchain::DEFAULT_DIFFICULTY;
use crate::error::{LedgerError, Result};
use crate::miner::MAX_DIFFICULTY;
use crate::persistence::{FileStore, InMemoryStore, KeyValueStore, LedgerStorage, SqliteStore, DEFAULT_STORAGE_KEY};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    /// Database file for `sqlite`, directory for `file`; unused for `memory`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_key")]
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            key: default_key(),
        }
    }
}

impl StorageConfig {
    /// The configured path, or the default location under the user's data directory.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        let base = default_data_dir();
        match self.backend {
            StorageBackend::Sqlite => base.join("ledger.db"),
            StorageBackend::File | StorageBackend::Memory => base.join("ledger"),
        }
    }

    /// Opens the configured backend.
    pub fn open(&self) -> Result<LedgerStorage> {
        let store: Arc<dyn KeyValueStore> = match self.backend {
            StorageBackend::Memory => Arc::new(InMemoryStore::new()),
            StorageBackend::Sqlite => Arc::new(SqliteStore::open(self.resolved_path())?),
            StorageBackend::File => Arc::new(FileStore::new(self.resolved_path())),
        };
        Ok(LedgerStorage::with_key(store, self.key.clone()))
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.ledger.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::Config(format!(
                "ledger.difficulty must be at most {}, got {}",
                MAX_DIFFICULTY, self.ledger.difficulty
            )));
        }
        if self.storage.key.trim().is_empty() {
            return Err(LedgerError::Config("storage.key must not be empty".to_string()));
        }
        if let Some(path) = &self.storage.path {
            if path.as_os_str().is_empty() {
                return Err(LedgerError::Config("storage.path must not be empty when set".to_string()));
            }
        }
        Ok(())
    }
}

pub fn parse_config(text: &str) -> Result<Config> {
    let config: Config = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Reads a TOML config file, falling back to defaults when it does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(text) => parse_config(&text),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(LedgerError::Config(format!("Failed to read {:?}: {}", path, e))),
    }
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

fn default_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("pixledger"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.ledger.difficulty, 2);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.key, "pix_blockchain");
        assert!(config.storage.resolved_path().ends_with("ledger.db"));
    }

    #[test]
    fn test_full_config() {
        let config = parse_config(
            r#"
            [ledger]
            difficulty = 3

            [storage]
            backend = "file"
            path = "/tmp/pix"
            key = "session_42"
            "#,
        )
        .unwrap();
        assert_eq!(config.ledger.difficulty, 3);
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage.resolved_path(), PathBuf::from("/tmp/pix"));
        assert_eq!(config.storage.key, "session_42");
    }

    #[test]
    fn test_disk_backends_without_path_use_data_dir() {
        let file = parse_config("[storage]\nbackend = \"file\"").unwrap();
        let sqlite = parse_config("[storage]\nbackend = \"sqlite\"").unwrap();
        assert_eq!(file.storage.path, None);
        assert_eq!(file.storage.resolved_path(), default_data_dir().join("ledger"));
        assert_eq!(sqlite.storage.resolved_path(), default_data_dir().join("ledger.db"));

        // An explicit but empty path is a mistake, not a request for the default.
        assert!(matches!(
            parse_config("[storage]\nbackend = \"file\"\npath = \"\""),
            Err(LedgerError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(parse_config("[ledger]\ndifficulty = 65"), Err(LedgerError::Config(_))));
        assert!(matches!(parse_config("[storage]\nkey = \" \""), Err(LedgerError::Config(_))));
        assert!(matches!(parse_config("[storage]\nbackend = \"redis\""), Err(LedgerError::Config(_))));
        assert!(matches!(parse_config("[ledger"), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.ledger.difficulty, DEFAULT_DIFFICULTY);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pixledger.toml");
        fs::write(&path, "[storage]\nbackend = \"memory\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.storage.open().unwrap().load().unwrap().is_none());
    }
}
