//! Per-call context and typed responders

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::network::{Incoming, Notify, ReplySink};
use crate::protocol::{Message, Method, RpcCode};

/// Framework-side state for one registered call
///
/// The call creates its context when it registers as an acceptor. When a
/// request is matched to it, the service places the request here before
/// posting the call's tag.
pub struct ServerContext {
    method: Method,
    incoming: Mutex<Option<Incoming>>,
}

impl ServerContext {
    pub fn new(method: Method) -> Arc<Self> {
        Arc::new(Self {
            method,
            incoming: Mutex::new(None),
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub(crate) fn deliver(&self, incoming: Incoming) {
        *self.incoming.lock() = Some(incoming);
    }

    /// Take the matched request. Yields it at most once.
    pub fn take_incoming(&self) -> Option<Incoming> {
        self.incoming.lock().take()
    }
}

/// Completes a unary call with a typed response
pub struct Responder<M> {
    reply: ReplySink,
    _message: PhantomData<fn(M)>,
}

impl<M: Message> Responder<M> {
    pub fn new(reply: ReplySink) -> Self {
        Self {
            reply,
            _message: PhantomData,
        }
    }

    /// Send the response; `notify` fires once it is on the wire
    pub fn finish(&self, message: &M, notify: Notify) {
        self.reply.reply(RpcCode::Ok, message.encode(), Some(notify));
    }

    /// Fail the call without a response message
    pub fn finish_with_error(&self, code: RpcCode, notify: Notify) {
        self.reply.reply(code, Vec::new(), Some(notify));
    }
}

/// Writes a server stream of typed messages
pub struct ServerWriter<M> {
    reply: ReplySink,
    _message: PhantomData<fn(M)>,
}

impl<M: Message> ServerWriter<M> {
    pub fn new(reply: ReplySink) -> Self {
        Self {
            reply,
            _message: PhantomData,
        }
    }

    /// Emit one element; `notify` fires once it is on the wire
    pub fn write(&self, message: &M, notify: Notify) {
        self.reply.item(message.encode(), Some(notify));
    }

    /// Close the stream with a final status
    pub fn finish(&self, code: RpcCode, notify: Notify) {
        self.reply.end(code, Some(notify));
    }
}
