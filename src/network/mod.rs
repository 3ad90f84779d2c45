//! Network Module
//!
//! TCP transport shared by both serving modes.
//!
//! ## Architecture
//! - Single acceptor thread
//! - One reader thread and one writer thread per connection
//! - Decoded calls handed to a [`Dispatch`] implementation; responses flow
//!   back through a [`ReplySink`] into the connection's writer thread

mod server;
mod connection;
mod reply;

pub use server::Server;
pub use connection::Connection;
pub use reply::{Dispatch, Incoming, Notify, Outbound, ReplySink};
