//! Persistence layer for PixLedger
//!
//! A ledger is stored as one opaque record under a fixed key in a
//! [`KeyValueStore`]. [`LedgerStorage`] owns the record format; the stores
//! only move bytes.

use crate::blockchain::{Block, Ledger};
use crate::error::StorageError;
use crate::miner::MAX_DIFFICULTY;
use crate::transaction::Transaction;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Key the ledger record is stored under unless configured otherwise.
pub const DEFAULT_STORAGE_KEY: &str = "pix_blockchain";

/// Version tag written into every record.
pub const RECORD_VERSION: u32 = 1;

/// Abstraction for byte-oriented storage backends. A `put` must either
/// replace the whole value or fail; partial writes are not allowed.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Simple in-memory store useful for tests and ephemeral sessions.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with [`StorageError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("in-memory store is offline".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check_available()?;
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.check_available()?;
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_available()?;
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// SQLite-backed store with a single key/value table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Unavailable(format!("Failed to create data dir {:?}: {}", parent, e))
                })?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Unavailable(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Unavailable(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| StorageError::Unavailable(format!("Failed to create kv table: {}", e)))?;

        Ok(SqliteStore { conn: Mutex::new(conn) })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let conn = self.conn.lock();
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(|e| StorageError::Unavailable(format!("Failed to read key {}: {}", key, e)))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .map_err(|e| StorageError::Unavailable(format!("Failed to write key {}: {}", key, e)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| StorageError::Unavailable(format!("Failed to delete key {}: {}", key, e)))?;
        Ok(())
    }
}

/// Directory-backed store: one file per key, replaced atomically on write.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let usable = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !usable {
            return Err(StorageError::Unavailable(format!("Key {:?} is not a usable file name", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Unavailable(format!("Failed to read {:?}: {}", path, e))),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let unavailable = |e: std::io::Error| StorageError::Unavailable(format!("Failed to write {:?}: {}", path, e));

        fs::create_dir_all(&self.dir).map_err(unavailable)?;
        let mut file = tempfile::NamedTempFile::new_in(&self.dir).map_err(unavailable)?;
        file.write_all(value).map_err(unavailable)?;
        file.as_file().sync_all().map_err(unavailable)?;
        file.persist(&path).map_err(|e| unavailable(e.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Unavailable(format!("Failed to delete {:?}: {}", path, e))),
        }
    }
}

/// On-disk shape of a persisted ledger.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub(crate) struct LedgerRecord {
    pub version: u32,
    pub difficulty: u32,
    pub chain: Vec<Block>,
    pub pending: Vec<Transaction>,
}

impl LedgerRecord {
    pub fn new(difficulty: u32, chain: Vec<Block>, pending: Vec<Transaction>) -> Self {
        LedgerRecord {
            version: RECORD_VERSION,
            difficulty,
            chain,
            pending,
        }
    }
}

/// Saves and restores a ledger under one key of a [`KeyValueStore`].
#[derive(Clone)]
pub struct LedgerStorage {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl fmt::Debug for LedgerStorage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LedgerStorage").field("key", &self.key).finish_non_exhaustive()
    }
}

impl LedgerStorage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, DEFAULT_STORAGE_KEY)
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        LedgerStorage { store, key: key.into() }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Writes the full chain and pending buffer of `ledger`.
    pub fn save(&self, ledger: &Ledger) -> Result<(), StorageError> {
        self.save_record(&ledger.to_record())
    }

    /// Restores the stored ledger exactly as written, without re-mining or rehashing.
    ///
    /// Returns `Ok(None)` when nothing is stored and [`StorageError::CorruptData`]
    /// when the stored bytes do not decode into a ledger.
    pub fn load(&self) -> Result<Option<Ledger>, StorageError> {
        let Some(bytes) = self.store.get(&self.key)? else {
            debug!(key = %self.key, "no stored ledger");
            return Ok(None);
        };
        let record = Self::decode(&bytes)?;
        info!(key = %self.key, blocks = record.chain.len(), pending = record.pending.len(), "loaded ledger");
        Ok(Some(Ledger::from_record(record, self.clone())))
    }

    /// Deletes the stored ledger. Only used for explicit resets.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(&self.key)?;
        info!(key = %self.key, "cleared stored ledger");
        Ok(())
    }

    pub(crate) fn save_record(&self, record: &LedgerRecord) -> Result<(), StorageError> {
        let bytes = Self::encode(record)?;
        self.write_bytes(&bytes)
    }

    pub(crate) fn write_bytes(&self, bytes: &[u8]) -> Result<(), StorageError> {
        self.store.put(&self.key, bytes)
    }

    pub(crate) fn encode(record: &LedgerRecord) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(record)
            .map_err(|e| StorageError::CorruptData(format!("Failed to serialize ledger: {}", e)))
    }

    fn decode(bytes: &[u8]) -> Result<LedgerRecord, StorageError> {
        let record: LedgerRecord = serde_json::from_slice(bytes)
            .map_err(|e| StorageError::CorruptData(format!("Failed to parse ledger: {}", e)))?;

        if record.version != RECORD_VERSION {
            return Err(StorageError::CorruptData(format!(
                "Unsupported record version {} (expected {})",
                record.version, RECORD_VERSION
            )));
        }
        if record.difficulty > MAX_DIFFICULTY {
            return Err(StorageError::CorruptData(format!(
                "Difficulty {} exceeds maximum {}",
                record.difficulty, MAX_DIFFICULTY
            )));
        }
        match record.chain.first() {
            None => return Err(StorageError::CorruptData("Stored chain is empty".to_string())),
            Some(genesis) if !genesis.is_genesis() => {
                return Err(StorageError::CorruptData(format!(
                    "First stored block is not a genesis block (index {}, previous hash {:?})",
                    genesis.index, genesis.previous_hash
                )));
            }
            Some(_) => {}
        }
        Ok(record)
    }
}
