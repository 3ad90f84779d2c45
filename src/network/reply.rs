//! Reply path
//!
//! Decoded inbound calls and the handle used to answer them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::{SendError, Sender};

use crate::protocol::{Method, ResponseFrame, RpcCode};

/// Completion callback for an outbound frame
///
/// Invoked exactly once with `true` after the frame has been written and
/// flushed, or `false` if it could not be delivered.
pub type Notify = Box<dyn FnOnce(bool) + Send + 'static>;

/// A frame queued for a connection's writer thread
pub struct Outbound {
    pub frame: ResponseFrame,
    pub notify: Option<Notify>,
}

/// Receives decoded calls from connections
pub trait Dispatch: Send + Sync + 'static {
    fn dispatch(&self, incoming: Incoming);
}

/// A decoded inbound call
pub struct Incoming {
    pub method: Method,
    pub payload: Bytes,
    pub reply: ReplySink,
    pub peer: String,
}

/// Sends response frames for one call back to its connection
#[derive(Clone)]
pub struct ReplySink {
    stream_id: u32,
    tx: Sender<Outbound>,

    /// Set by the writer thread once the socket has failed
    broken: Arc<AtomicBool>,
}

impl ReplySink {
    pub fn new(stream_id: u32, tx: Sender<Outbound>) -> Self {
        Self::attached(stream_id, tx, Arc::new(AtomicBool::new(false)))
    }

    /// A sink sharing its connection writer's broken flag
    pub fn attached(stream_id: u32, tx: Sender<Outbound>, broken: Arc<AtomicBool>) -> Self {
        Self {
            stream_id,
            tx,
            broken,
        }
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Whether frames can still reach the peer
    pub fn is_open(&self) -> bool {
        !self.broken.load(Ordering::Acquire)
    }

    /// Queue a frame. Returns `false` if the connection is already gone, in
    /// which case the notifier fires immediately with `false`.
    pub fn send(&self, frame: ResponseFrame, notify: Option<Notify>) -> bool {
        let outbound = Outbound { frame, notify };

        let rejected = if self.is_open() {
            match self.tx.send(outbound) {
                Ok(()) => return true,
                Err(SendError(outbound)) => outbound,
            }
        } else {
            outbound
        };

        tracing::trace!("Connection closed before stream {} replied", self.stream_id);
        if let Some(notify) = rejected.notify {
            notify(false);
        }
        false
    }

    /// Complete a unary call
    pub fn reply(&self, code: RpcCode, message: Vec<u8>, notify: Option<Notify>) -> bool {
        let frame = ResponseFrame::Reply {
            stream_id: self.stream_id,
            code,
            message: Bytes::from(message),
        };
        self.send(frame, notify)
    }

    /// Emit one stream element
    pub fn item(&self, message: Vec<u8>, notify: Option<Notify>) -> bool {
        let frame = ResponseFrame::Item {
            stream_id: self.stream_id,
            message: Bytes::from(message),
        };
        self.send(frame, notify)
    }

    /// Complete a stream
    pub fn end(&self, code: RpcCode, notify: Option<Notify>) -> bool {
        let frame = ResponseFrame::End {
            stream_id: self.stream_id,
            code,
        };
        self.send(frame, notify)
    }

    /// Terminate a call of either shape with a non-Ok code
    pub fn reject(&self, method: Option<Method>, code: RpcCode) {
        match method {
            Some(m) if m.is_streaming() => self.end(code, None),
            _ => self.reply(code, Vec::new(), None),
        };
    }
}
