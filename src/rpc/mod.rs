//! RPC Module
//!
//! The completion-queue side of the framework used by async serving.
//!
//! ## Flow
//! ```text
//!  connection ──Incoming──▶ AsyncService ──(fill context, post tag)──▶ CompletionQueue
//!                                ▲                                           │
//!                    request_call│                                     next()│
//!                                │                                           ▼
//!                              Call ◀──────────── worker thread ◀──── Event { tag, ok }
//!                                │
//!                                └── Responder / ServerWriter ──frame + notifier──▶ writer thread
//!                                                                      │
//!                                       CompletionQueue ◀──Event(tag, ok)┘
//! ```
//!
//! A tag is a generation-checked handle into the owning worker's call table.

mod queue;
mod context;
mod service;

pub use queue::{CompletionQueue, Event, Tag};
pub use context::{Responder, ServerContext, ServerWriter};
pub use service::AsyncService;
