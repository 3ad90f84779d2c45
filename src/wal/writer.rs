//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::WalSyncStrategy;
use crate::error::Result;

use super::{Operation, WalEntry};

/// Writes entries to the WAL file
pub struct WalWriter {
    writer: BufWriter<File>,

    /// LSN of the last appended entry
    current_lsn: u64,

    sync_strategy: WalSyncStrategy,

    /// Entries appended since the last fsync
    unsynced: usize,
}

impl WalWriter {
    /// Open a WAL file for appending, continuing after `last_lsn`
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy, last_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            current_lsn: last_lsn,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Create (or truncate) a WAL file, starting from LSN 1
    pub fn create(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            current_lsn: 0,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Append an operation, returning its LSN
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        let lsn = self.current_lsn + 1;
        let bytes = WalEntry::new(lsn, operation).serialize()?;

        self.writer.write_all(&bytes)?;
        self.current_lsn = lsn;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count.max(1),
        };
        if due {
            self.sync()?;
        } else {
            self.writer.flush()?;
        }

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Get the current LSN
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }
}
