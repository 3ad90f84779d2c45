//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};

/// Header size: LSN (8) + CRC (4) + data length (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single entry's data block
pub const MAX_ENTRY_SIZE: u32 = 64 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl WalEntry {
    /// Create an entry stamped with the current wall clock
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Serialize to the on-disk format: header followed by the data block
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(self)?;
        if data.len() > MAX_ENTRY_SIZE as usize {
            return Err(KvError::WalWrite(format!(
                "entry too large: {} bytes (max {})",
                data.len(),
                MAX_ENTRY_SIZE
            )));
        }

        let crc = Self::compute_crc(&data);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + data.len());
        bytes.put_u64_le(self.lsn);
        bytes.put_u32_le(crc);
        bytes.put_u32_le(data.len() as u32);
        bytes.put_slice(&data);
        Ok(bytes)
    }

    /// Deserialize the data block (header already stripped and verified)
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }

    /// CRC32 of a data block
    pub fn compute_crc(data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}
