//! MemTable Module
//!
//! Ordered in-memory table holding the engine's live data.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Track size for stats
//! - Ordered seeks for cursor-style iteration
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (required for scans and checkpoints)
//! - Deletes remove the key outright; there is no older layer to shadow

mod table;

pub use table::MemTable;
