//! Engine Module
//!
//! The storage engine behind the service: an ordered in-memory table made
//! durable by a write-ahead log.
//!
//! ## Responsibilities
//! - Serve get/set/delete and ordered cursors to the serving layer
//! - Handle concurrent read/write access
//! - Manage crash recovery and log checkpointing on startup

use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::memtable::MemTable;
use crate::store::{Record, Store, StoreIterator};
use crate::wal::{Operation, WalRecovery, WalWriter};

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (set/delete): Serialized by the `wal` mutex, which is held
///   across the log append and the table mutation so both see the same order
/// - **Reads** (get/iter): Only take the MemTable's internal read lock
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Write-ahead log (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// Live data (internal RwLock), shared with open iterators
    memtable: Arc<MemTable>,

    /// Set once by `close`
    closed: Arc<AtomicBool>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const CHECKPOINT_FILENAME: &'static str = "wal.log.tmp";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Recover from WAL if it exists
    /// 3. Checkpoint the recovered state into a fresh WAL
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let wal_path = config.data_dir.join(Self::WAL_FILENAME);
        let memtable = MemTable::new();

        let wal = if wal_path.exists() {
            let (entries, recovery_result) = WalRecovery::recover(&wal_path)?;

            if recovery_result.entries_recovered > 0 || recovery_result.entries_corrupted > 0 {
                tracing::info!(
                    "WAL recovery: {} entries recovered, {} corrupted, last_lsn={}",
                    recovery_result.entries_recovered,
                    recovery_result.entries_corrupted,
                    recovery_result.last_lsn
                );
            }

            for entry in entries {
                match entry.operation {
                    Operation::Put { key, value } => {
                        memtable.put(key, value);
                    }
                    Operation::Delete { key } => {
                        memtable.delete(&key);
                    }
                }
            }

            Self::checkpoint(&config, &memtable)?
        } else {
            WalWriter::create(&wal_path, config.wal_sync_strategy)?
        };

        tracing::info!(
            "Opened engine at {} ({} keys)",
            config.data_dir.display(),
            memtable.entry_count()
        );

        Ok(Self {
            config,
            wal: Mutex::new(wal),
            memtable: Arc::new(memtable),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Rewrite the WAL so it holds exactly one Put per live key
    ///
    /// The new log is written beside the old one and renamed over it, so a
    /// crash mid-checkpoint leaves the previous log intact.
    fn checkpoint(config: &Config, memtable: &MemTable) -> Result<WalWriter> {
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);
        let tmp_path = config.data_dir.join(Self::CHECKPOINT_FILENAME);

        let last_lsn = {
            let mut writer = WalWriter::create(&tmp_path, config.wal_sync_strategy)?;
            for (key, value) in memtable.snapshot() {
                writer.append(Operation::Put { key, value })?;
            }
            writer.sync()?;
            writer.current_lsn()
        };

        fs::rename(&tmp_path, &wal_path)?;
        tracing::debug!("Checkpointed WAL with {} entries", last_lsn);

        WalWriter::open(&wal_path, config.wal_sync_strategy, last_lsn)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvError::StoreClosed);
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Path of the write-ahead log
    pub fn wal_path(&self) -> PathBuf {
        self.config.data_dir.join(Self::WAL_FILENAME)
    }

    /// Get the memtable entry count
    pub fn entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Store for Engine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.memtable.get(key))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open()?;

        let mut wal = self.wal.lock();
        wal.append(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })?;
        self.memtable.put(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.ensure_open()?;

        let mut wal = self.wal.lock();
        wal.append(Operation::Delete { key: key.to_vec() })?;
        self.memtable.delete(key);
        Ok(())
    }

    fn iter(&self, start: Option<&[u8]>) -> Result<Box<dyn StoreIterator>> {
        self.ensure_open()?;

        let from = match start {
            Some(key) => Bound::Included(key),
            None => Bound::Unbounded,
        };
        let current = self
            .memtable
            .seek(from)
            .map(|(key, value)| Record { key, value });

        Ok(Box::new(EngineIterator {
            memtable: Arc::clone(&self.memtable),
            closed: Arc::clone(&self.closed),
            current,
        }))
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.wal.lock().sync()?;
        tracing::info!("Closed engine at {}", self.config.data_dir.display());
        Ok(())
    }
}

/// Live cursor over the engine's table
///
/// Holds the last key it visited rather than a lock, so it may stay open
/// across many write cycles. Writes landing after the cursor are visible to it.
pub struct EngineIterator {
    memtable: Arc<MemTable>,
    closed: Arc<AtomicBool>,
    current: Option<Record>,
}

impl StoreIterator for EngineIterator {
    fn get(&self) -> Result<Option<Record>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvError::StoreClosed);
        }
        Ok(self.current.clone())
    }

    fn next(&mut self) -> Result<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvError::StoreClosed);
        }

        let Some(current) = self.current.take() else {
            return Ok(false);
        };

        self.current = self
            .memtable
            .seek(Bound::Excluded(current.key.as_slice()))
            .map(|(key, value)| Record { key, value });

        Ok(self.current.is_some())
    }
}
