//! MemTable Tests
//!
//! Tests verify:
//! - Basic CRUD operations
//! - Size tracking
//! - Ordered seeks used by store iterators
//! - Clear functionality
//! - Concurrent access patterns

use std::ops::Bound;
use std::sync::Arc;
use std::thread;

use kvstore::memtable::MemTable;

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let memtable = MemTable::new();
    assert_eq!(memtable.entry_count(), 0);
    assert_eq!(memtable.size(), 0);
    assert!(memtable.is_empty());
}

#[test]
fn test_put_and_get() {
    let memtable = MemTable::new();

    memtable.put(b"key1".to_vec(), b"value1".to_vec());

    assert_eq!(memtable.get(b"key1"), Some(b"value1".to_vec()));
    assert_eq!(memtable.get(b"nonexistent"), None);
}

#[test]
fn test_put_overwrites_existing() {
    let memtable = MemTable::new();

    memtable.put(b"key".to_vec(), b"v1".to_vec());
    memtable.put(b"key".to_vec(), b"v2".to_vec());

    assert_eq!(memtable.get(b"key"), Some(b"v2".to_vec()));
    assert_eq!(memtable.entry_count(), 1);
}

#[test]
fn test_delete_removes_entry() {
    let memtable = MemTable::new();
    memtable.put(b"key".to_vec(), b"value".to_vec());

    assert!(memtable.delete(b"key"));
    assert!(!memtable.delete(b"key"));
    assert_eq!(memtable.get(b"key"), None);
    assert!(memtable.is_empty());
}

// =============================================================================
// Size Tracking Tests
// =============================================================================

#[test]
fn test_size_tracking() {
    let memtable = MemTable::new();

    assert_eq!(memtable.put(b"key".to_vec(), b"value".to_vec()), 8);

    // Overwrite only changes the value portion
    assert_eq!(memtable.put(b"key".to_vec(), b"longer value".to_vec()), 15);
    assert_eq!(memtable.put(b"key".to_vec(), b"v".to_vec()), 4);

    memtable.put(b"other".to_vec(), b"xy".to_vec());
    assert_eq!(memtable.size(), 11);

    memtable.delete(b"key");
    assert_eq!(memtable.size(), 7);
}

// =============================================================================
// Seek Tests
// =============================================================================

#[test]
fn test_seek_bounds() {
    let memtable = MemTable::new();
    for key in ["b", "d", "f"] {
        memtable.put(key.as_bytes().to_vec(), key.to_uppercase().into_bytes());
    }

    let key = |found: Option<(Vec<u8>, Vec<u8>)>| found.map(|(k, _)| k);

    assert_eq!(key(memtable.seek(Bound::Unbounded)), Some(b"b".to_vec()));
    assert_eq!(key(memtable.seek(Bound::Included(b"d".as_slice()))), Some(b"d".to_vec()));
    assert_eq!(key(memtable.seek(Bound::Excluded(b"d".as_slice()))), Some(b"f".to_vec()));
    assert_eq!(key(memtable.seek(Bound::Included(b"c".as_slice()))), Some(b"d".to_vec()));
    assert_eq!(key(memtable.seek(Bound::Excluded(b"f".as_slice()))), None);
}

#[test]
fn test_snapshot_sorted_order() {
    let memtable = MemTable::new();
    for i in (0..1000).rev() {
        memtable.put(format!("key{:04}", i).into_bytes(), vec![0u8; 4]);
    }

    let entries = memtable.snapshot();
    assert_eq!(entries.len(), 1000);
    for pair in entries.windows(2) {
        assert!(pair[0].0 < pair[1].0);
    }
}

#[test]
fn test_clear() {
    let memtable = MemTable::new();
    memtable.put(b"a".to_vec(), b"1".to_vec());
    memtable.put(b"b".to_vec(), b"2".to_vec());

    memtable.clear();

    assert!(memtable.is_empty());
    assert_eq!(memtable.size(), 0);
    assert_eq!(memtable.seek(Bound::Unbounded), None);
}

// =============================================================================
// Concurrent Access Tests (Basic)
// =============================================================================

#[test]
fn test_concurrent_reads_during_writes() {
    let memtable = Arc::new(MemTable::new());
    memtable.put(b"stable".to_vec(), b"value".to_vec());

    let mut handles = vec![];

    for i in 0..4 {
        let mt = Arc::clone(&memtable);
        handles.push(thread::spawn(move || {
            for j in 0..50 {
                mt.put(format!("key{}_{}", i, j).into_bytes(), b"v".to_vec());
            }
        }));
    }
    for _ in 0..4 {
        let mt = Arc::clone(&memtable);
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                assert_eq!(mt.get(b"stable"), Some(b"value".to_vec()));
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(memtable.entry_count(), 201);
}
