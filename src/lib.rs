//! # kvstore
//!
//! A key-value service with two serving modes over one storage engine:
//! - Sync: each request handled to completion on its connection thread
//! - Async: pre-registered calls driven by per-worker completion queues
//! - Write-Ahead Logging (WAL) with crash recovery for the engine
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 TCP Server (reader + writer                  │
//! │                 thread per connection)                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Incoming
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────────┐
//!   │ KvStore     │          │  AsyncService    │──▶ CompletionQueue × N
//!   │ Service     │          │  (acceptor FIFO) │        │
//!   │ (sync)      │          └──────────────────┘        ▼
//!   └──────┬──────┘                               Worker threads (Calls)
//!          │                                              │
//!          └──────────────────┬───────────────────────────┘
//!                             ▼
//!                    ┌─────────────────┐
//!                    │  Store: Engine  │
//!                    │  WAL + MemTable │
//!                    └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod memtable;
pub mod store;
pub mod engine;
pub mod protocol;
pub mod network;
pub mod rpc;
pub mod server;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{Config, ServeMode, WalSyncStrategy};
pub use engine::Engine;
pub use store::{Record, Store, StoreIterator};
pub use server::KvServer;
pub use client::KvClient;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
