//! Call state machine
//!
//! One `Call` is one in-flight RPC on the async path, from the moment it is
//! registered as an acceptor until it is released.
//!
//! ```text
//! unary (Get, Put, Delete, Warmup):  CREATE ─▶ PROCESS ─▶ FINISH ─▶ released
//! streaming (Scan):                  CREATE ─▶ PROCESS ─▶ WRITING ⟲ ─▶ FINISH ─▶ released
//! ```
//!
//! Every transition out of PROCESS or WRITING issues exactly one outbound
//! frame carrying the call's tag, so a call never has two completions pending.

use std::sync::Arc;

use crate::network::{Incoming, Notify, ReplySink};
use crate::protocol::{
    DeleteReq, DeleteResp, GetReq, GetResp, Message, Method, PutReq, PutResp, RpcCode, ScanReq,
    WarmupReq, WarmupResp,
};
use crate::rpc::{AsyncService, CompletionQueue, Responder, ServerContext, ServerWriter, Tag};
use crate::store::Store;

use super::handlers;
use super::scan::{ScanSession, WriteStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Create,
    Process,
    Writing,
    Finish,
}

/// What the worker should do after advancing a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// An async operation tagged with the call is pending
    Pending,

    /// The call is done; remove it from the table
    Release,
}

/// The five operation kinds
pub enum CallKind {
    Get,
    Put,
    Delete,
    Scan(ScanSession),
    Warmup,
}

impl CallKind {
    pub fn for_method(method: Method) -> Self {
        match method {
            Method::Get => CallKind::Get,
            Method::Put => CallKind::Put,
            Method::Delete => CallKind::Delete,
            Method::Scan => CallKind::Scan(ScanSession::default()),
            Method::Warmup => CallKind::Warmup,
        }
    }

    pub fn method(&self) -> Method {
        match self {
            CallKind::Get => Method::Get,
            CallKind::Put => Method::Put,
            CallKind::Delete => Method::Delete,
            CallKind::Scan(_) => Method::Scan,
            CallKind::Warmup => Method::Warmup,
        }
    }
}

pub struct Call {
    state: CallState,
    kind: CallKind,
    ctx: Arc<ServerContext>,
    store: Arc<dyn Store>,

    /// The matched request, kept until the call is released
    incoming: Option<Incoming>,
}

impl Call {
    pub fn new(method: Method, store: Arc<dyn Store>) -> Self {
        Self {
            state: CallState::Create,
            kind: CallKind::for_method(method),
            ctx: ServerContext::new(method),
            store,
            incoming: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn method(&self) -> Method {
        self.kind.method()
    }

    /// Offer this call as the next acceptor for its method on `queue`
    pub fn register(&mut self, tag: Tag, service: &AsyncService, queue: &Arc<CompletionQueue>) {
        debug_assert_eq!(self.state, CallState::Create);
        self.state = CallState::Process;
        service.request_call(Arc::clone(&self.ctx), queue, tag);
    }

    /// Handle a successful completion for this call
    ///
    /// The caller has already spawned this call's replacement acceptor when
    /// the call was in PROCESS.
    pub fn advance(&mut self, tag: Tag, queue: &Arc<CompletionQueue>) -> Step {
        match self.state {
            CallState::Create => {
                tracing::warn!("{:?} advanced before registration", tag);
                Step::Release
            }
            CallState::Process => self.process(tag, queue),
            CallState::Writing => {
                self.write(tag, queue);
                Step::Pending
            }
            CallState::Finish => Step::Release,
        }
    }

    fn process(&mut self, tag: Tag, queue: &Arc<CompletionQueue>) -> Step {
        let Some(incoming) = self.ctx.take_incoming() else {
            tracing::warn!("{:?} woke in PROCESS without a request", tag);
            return Step::Release;
        };

        tracing::trace!(
            "{} call {:?} processing stream {} from {}",
            self.method().name(),
            tag,
            incoming.reply.stream_id(),
            incoming.peer
        );

        let store = self.store.as_ref();
        let notify = queue.notifier(tag);
        let reply = incoming.reply.clone();

        match &mut self.kind {
            CallKind::Get => {
                self.state = CallState::Finish;
                finish_unary(reply, &incoming, notify, |req: GetReq| -> Result<GetResp, RpcCode> {
                    Ok(handlers::get(store, &req))
                });
            }
            CallKind::Put => {
                self.state = CallState::Finish;
                finish_unary(reply, &incoming, notify, |req: PutReq| -> Result<PutResp, RpcCode> {
                    Ok(handlers::put(store, &req))
                });
            }
            CallKind::Delete => {
                self.state = CallState::Finish;
                finish_unary(reply, &incoming, notify, |req: DeleteReq| -> Result<DeleteResp, RpcCode> {
                    Ok(handlers::delete(store, &req))
                });
            }
            CallKind::Warmup => {
                self.state = CallState::Finish;
                finish_unary(reply, &incoming, notify, |req: WarmupReq| -> Result<WarmupResp, RpcCode> {
                    handlers::warmup(&req)
                });
            }
            CallKind::Scan(session) => {
                let writer = ServerWriter::new(reply);
                let started = match ScanReq::decode(&incoming.payload) {
                    Ok(req) => session.start(store, &req, writer).map_err(|e| {
                        tracing::warn!("Scan could not open an iterator: {}", e);
                        RpcCode::Internal
                    }),
                    Err(e) => {
                        tracing::debug!("Bad ScanReq from {}: {}", incoming.peer, e);
                        Err(RpcCode::InvalidArgument)
                    }
                };

                match started {
                    Ok(()) => {
                        self.state = CallState::Writing;
                        if let WriteStep::Finished(_) = session.write_step(notify) {
                            self.state = CallState::Finish;
                        }
                    }
                    Err(code) => {
                        self.state = CallState::Finish;
                        incoming.reply.end(code, Some(notify));
                    }
                }
            }
        }

        self.incoming = Some(incoming);
        Step::Pending
    }

    fn write(&mut self, tag: Tag, queue: &Arc<CompletionQueue>) {
        let CallKind::Scan(session) = &mut self.kind else {
            tracing::warn!("{:?} in WRITING is not a stream", tag);
            self.state = CallState::Finish;
            queue.post(tag, true);
            return;
        };

        if let WriteStep::Finished(code) = session.write_step(queue.notifier(tag)) {
            tracing::trace!("Scan {:?} finishing with {:?}", tag, code);
            self.state = CallState::Finish;
        }
    }

    /// Free per-call resources. Safe to call more than once.
    pub fn release(&mut self) {
        if let CallKind::Scan(session) = &mut self.kind {
            session.release();
        }
        self.incoming = None;
    }

    /// Whether a Scan call still holds its iterator
    pub fn holds_iterator(&self) -> bool {
        matches!(&self.kind, CallKind::Scan(session) if session.holds_iterator())
    }
}

/// Decode, run and answer a unary request
fn finish_unary<Req, Resp, F>(
    reply: ReplySink,
    incoming: &Incoming,
    notify: Notify,
    handle: F,
) where
    Req: Message,
    Resp: Message,
    F: FnOnce(Req) -> Result<Resp, RpcCode>,
{
    let responder = Responder::<Resp>::new(reply);

    let result = Req::decode(&incoming.payload)
        .map_err(|e| {
            tracing::debug!("Bad {} from {}: {}", Req::NAME, incoming.peer, e);
            RpcCode::InvalidArgument
        })
        .and_then(handle);

    match result {
        Ok(resp) => responder.finish(&resp, notify),
        Err(code) => responder.finish_with_error(code, notify),
    }
}
