//! Store Module
//!
//! The storage contract consumed by both serving modes.
//!
//! The serving layer never locks around the store: implementations must be
//! safe for concurrent use from every worker thread. Lifecycle is explicit,
//! the server opens a store before starting and calls [`Store::close`]
//! exactly once when it stops.

use crate::error::Result;

/// A key-value record yielded by a [`StoreIterator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Key-value storage engine
pub trait Store: Send + Sync + 'static {
    /// Look up a key. `Ok(None)` means not found.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Insert or overwrite a key
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove a key. Removing a missing key succeeds.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Cursor positioned at the first key `>= start`, or at the first key
    fn iter(&self, start: Option<&[u8]>) -> Result<Box<dyn StoreIterator>>;

    /// Flush and release resources. Later calls are no-ops.
    fn close(&self) -> Result<()>;
}

/// Cursor over records in ascending key order
pub trait StoreIterator: Send {
    /// Current record, or `None` once the cursor is past the end
    fn get(&self) -> Result<Option<Record>>;

    /// Move to the following record. Returns `false` at the end.
    fn next(&mut self) -> Result<bool>;
}
