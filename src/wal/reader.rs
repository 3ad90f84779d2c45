//! WAL Reader
//!
//! Reads entries sequentially, classifying each frame as valid, corrupted or
//! truncated so that recovery can decide what to keep.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use bytes::Buf;

use crate::error::Result;

use super::entry::MAX_ENTRY_SIZE;
use super::{WalEntry, HEADER_SIZE};

/// Outcome of reading one frame
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete entry whose CRC matched
    Entry(WalEntry),

    /// A complete frame whose CRC or payload did not check out
    Corrupted { lsn: u64 },

    /// The file ends in the middle of a frame
    Truncated,

    /// Clean end of file
    Eof,
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,

    /// Offset of the first byte after the last complete frame
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Offset just past the last complete frame read so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next frame
    pub fn next_frame(&mut self) -> Result<ReadOutcome> {
        let mut header = [0u8; HEADER_SIZE];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(ReadOutcome::Eof),
            n if n < HEADER_SIZE => return Ok(ReadOutcome::Truncated),
            _ => {}
        }

        let mut fields = &header[..];
        let lsn = fields.get_u64_le();
        let crc = fields.get_u32_le();
        let len = fields.get_u32_le();

        // A garbage length means we can no longer find frame boundaries
        if len > MAX_ENTRY_SIZE {
            return Ok(ReadOutcome::Truncated);
        }

        let mut data = vec![0u8; len as usize];
        if read_full(&mut self.reader, &mut data)? < data.len() {
            return Ok(ReadOutcome::Truncated);
        }

        self.position += (HEADER_SIZE + data.len()) as u64;

        if WalEntry::compute_crc(&data) != crc {
            return Ok(ReadOutcome::Corrupted { lsn });
        }

        match WalEntry::deserialize(&data) {
            Ok(entry) => Ok(ReadOutcome::Entry(entry)),
            Err(_) => Ok(ReadOutcome::Corrupted { lsn }),
        }
    }
}

/// Like `read_exact`, but reports how many bytes were available at EOF
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
