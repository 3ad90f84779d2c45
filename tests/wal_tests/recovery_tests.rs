//! Tests for the WAL
//!
//! These tests verify:
//! - Entry framing and CRC checks
//! - Recovery from a clean WAL (no corruption)
//! - Recovery with partial writes (truncated tail)
//! - Recovery with corrupted entries (CRC mismatch)
//! - Verify mode (stats only, file untouched)

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Buf;
use kvstore::config::WalSyncStrategy;
use kvstore::wal::{Operation, ReadOutcome, WalEntry, WalReader, WalRecovery, WalWriter, HEADER_SIZE};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

/// Write entries using WalWriter (produces a well-formed WAL)
fn write_entries_via_writer(path: &Path, count: usize) {
    let mut writer = WalWriter::create(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer
            .append(Operation::Put {
                key: format!("key{}", i).into_bytes(),
                value: format!("value{}", i).into_bytes(),
            })
            .unwrap();
    }
}

/// Write raw serialized entries directly to a file (for crafting corruption)
fn write_raw_entries(path: &Path, entries: &[WalEntry]) {
    let mut file = File::create(path).unwrap();
    for entry in entries {
        file.write_all(&entry.serialize().unwrap()).unwrap();
    }
    file.sync_all().unwrap();
}

fn put(lsn: u64, key: &str) -> WalEntry {
    WalEntry::new(
        lsn,
        Operation::Put {
            key: key.as_bytes().to_vec(),
            value: b"v".to_vec(),
        },
    )
}

// =============================================================================
// Entry Tests
// =============================================================================

#[test]
fn test_entry_header_layout() {
    let entry = put(42, "k");
    let bytes = entry.serialize().unwrap();

    let mut header = &bytes[..HEADER_SIZE];
    assert_eq!(header.get_u64_le(), 42);
    let crc = header.get_u32_le();
    let len = header.get_u32_le() as usize;
    assert_eq!(bytes.len(), HEADER_SIZE + len);

    assert_eq!(crc, WalEntry::compute_crc(&bytes[HEADER_SIZE..]));
    assert_eq!(WalEntry::deserialize(&bytes[HEADER_SIZE..]).unwrap(), entry);
}

#[test]
fn test_reader_decodes_full_width_header_fields() {
    let (_temp, wal_path) = setup_temp_wal();
    let lsn = u64::MAX - 7;

    let good = put(lsn, "wide");
    let mut bad = put(lsn + 1, "wide").serialize().unwrap();
    let last = bad.len() - 1;
    bad[last] ^= 0x01;

    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&good.serialize().unwrap()).unwrap();
    file.write_all(&bad).unwrap();
    drop(file);

    let mut reader = WalReader::open(&wal_path).unwrap();
    match reader.next_frame().unwrap() {
        ReadOutcome::Entry(entry) => assert_eq!(entry, good),
        other => panic!("expected entry, got {:?}", other),
    }
    match reader.next_frame().unwrap() {
        ReadOutcome::Corrupted { lsn: seen } => assert_eq!(seen, lsn + 1),
        other => panic!("expected corrupted frame, got {:?}", other),
    }
    assert!(matches!(reader.next_frame().unwrap(), ReadOutcome::Eof));
}

#[test]
fn test_reader_classifies_frames() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut bad = put(2, "b").serialize().unwrap();
    let last = bad.len() - 1;
    bad[last] ^= 0xFF;

    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&put(1, "a").serialize().unwrap()).unwrap();
    file.write_all(&bad).unwrap();
    file.write_all(&put(3, "c").serialize().unwrap()[..HEADER_SIZE + 1]).unwrap();
    drop(file);

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(matches!(reader.next_frame().unwrap(), ReadOutcome::Entry(e) if e.lsn == 1));
    assert!(matches!(reader.next_frame().unwrap(), ReadOutcome::Corrupted { lsn: 2 }));
    assert!(matches!(reader.next_frame().unwrap(), ReadOutcome::Truncated));
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_writer_assigns_increasing_lsns() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::create(&wal_path, WalSyncStrategy::EveryNEntries { count: 10 }).unwrap();

    let a = writer.append(Operation::Delete { key: b"a".to_vec() }).unwrap();
    let b = writer.append(Operation::Delete { key: b"b".to_vec() }).unwrap();
    assert_eq!((a, b), (1, 2));
    assert_eq!(writer.current_lsn(), 2);
}

#[test]
fn test_writer_open_appends_after_last_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);

    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite, 3).unwrap();
        assert_eq!(writer.append(Operation::Delete { key: b"key0".to_vec() }).unwrap(), 4);
    }

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(result.last_lsn, 4);
    assert_eq!(entries[3].operation, Operation::Delete { key: b"key0".to_vec() });
}

// =============================================================================
// Recover: Clean WAL Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 0);
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.entries_corrupted, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_clean_wal() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 10);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.last_lsn, 10);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.lsn, i as u64 + 1);
    }
}

// =============================================================================
// Recover: Partial Write Tests
// =============================================================================

#[test]
fn test_recover_truncates_partial_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);
    let clean_len = fs::metadata(&wal_path).unwrap().len();

    // Half of a fourth entry
    let partial = put(4, "key3").serialize().unwrap();
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&partial[..partial.len() / 2]).unwrap();
    drop(file);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 3);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), clean_len);
}

#[test]
fn test_recover_partial_header_only() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);

    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[0u8; HEADER_SIZE - 3]).unwrap();
    drop(file);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(result.was_truncated);
}

// =============================================================================
// Recover: Corruption Tests
// =============================================================================

#[test]
fn test_recover_skips_corrupted_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    write_raw_entries(&wal_path, &[put(1, "a"), put(2, "b"), put(3, "c")]);

    // Flip a byte inside the second entry's data block
    let mut bytes = fs::read(&wal_path).unwrap();
    let first_len = put(1, "a").serialize().unwrap().len();
    bytes[first_len + HEADER_SIZE + 2] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(entries.iter().map(|e| e.lsn).collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(result.last_lsn, 3);
}

// =============================================================================
// Verify Tests
// =============================================================================

#[test]
fn test_verify_does_not_modify_file() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 4);

    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[1, 2, 3]).unwrap();
    drop(file);
    let len_before = fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 4);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), len_before);
}
