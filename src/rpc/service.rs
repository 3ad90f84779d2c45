//! Async service
//!
//! Matches inbound requests with registered acceptor calls.
//!
//! Each method keeps a FIFO of waiting acceptors (one per worker queue while
//! the server is healthy) and a backlog of requests that arrived while every
//! acceptor for that method was busy being replaced. Matching the oldest
//! waiting acceptor spreads requests across the worker queues.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::network::{Dispatch, Incoming};
use crate::protocol::{Method, RpcCode};

use super::{CompletionQueue, ServerContext, Tag};

struct Acceptor {
    ctx: Arc<ServerContext>,
    queue: Arc<CompletionQueue>,
    tag: Tag,
}

impl Acceptor {
    fn accept(self, incoming: Incoming) {
        self.ctx.deliver(incoming);
        if !self.queue.post(self.tag, true) {
            tracing::debug!("Queue {} closed before {:?} was accepted", self.queue.index(), self.tag);
        }
    }
}

#[derive(Default)]
struct MethodSlot {
    waiting: VecDeque<Acceptor>,
    backlog: VecDeque<Incoming>,
}

/// Framework side of async serving
pub struct AsyncService {
    slots: [Mutex<MethodSlot>; 5],
    shutdown: AtomicBool,
}

impl AsyncService {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Register a call as the next acceptor for its context's method
    ///
    /// If a request is already waiting it is delivered immediately. After
    /// shutdown the tag is posted back with `ok = false`.
    pub fn request_call(&self, ctx: Arc<ServerContext>, queue: &Arc<CompletionQueue>, tag: Tag) {
        let mut slot = self.slots[ctx.method().index()].lock();

        if self.shutdown.load(Ordering::Acquire) {
            drop(slot);
            queue.post(tag, false);
            return;
        }

        let acceptor = Acceptor {
            ctx,
            queue: Arc::clone(queue),
            tag,
        };

        match slot.backlog.pop_front() {
            Some(incoming) => acceptor.accept(incoming),
            None => slot.waiting.push_back(acceptor),
        }
    }

    /// Acceptors currently waiting for a `method` request
    pub fn waiting_acceptors(&self, method: Method) -> usize {
        self.slots[method.index()].lock().waiting.len()
    }

    /// Waiting acceptors for `method` registered on a given queue
    pub fn waiting_on_queue(&self, method: Method, queue: usize) -> usize {
        self.slots[method.index()]
            .lock()
            .waiting
            .iter()
            .filter(|a| a.queue.index() == queue)
            .count()
    }

    /// Requests for `method` not yet matched with an acceptor
    pub fn backlog_len(&self, method: Method) -> usize {
        self.slots[method.index()].lock().backlog.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop matching requests
    ///
    /// Every waiting acceptor gets its tag back with `ok = false`, and queued
    /// requests are answered `Unavailable`.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut released = 0;
        let mut rejected = 0;
        for (slot, method) in self.slots.iter().zip(Method::ALL) {
            let (waiting, backlog) = {
                let mut slot = slot.lock();
                (
                    std::mem::take(&mut slot.waiting),
                    std::mem::take(&mut slot.backlog),
                )
            };

            released += waiting.len();
            rejected += backlog.len();
            for acceptor in waiting {
                acceptor.queue.post(acceptor.tag, false);
            }
            for incoming in backlog {
                incoming.reply.reject(Some(method), RpcCode::Unavailable);
            }
        }

        tracing::info!(
            "Async service shut down: {} acceptors released, {} queued requests rejected",
            released,
            rejected
        );
    }
}

impl Default for AsyncService {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatch for AsyncService {
    fn dispatch(&self, incoming: Incoming) {
        let method = incoming.method;
        let mut slot = self.slots[method.index()].lock();

        if self.shutdown.load(Ordering::Acquire) {
            drop(slot);
            incoming.reply.reject(Some(method), RpcCode::Unavailable);
            return;
        }

        match slot.waiting.pop_front() {
            Some(acceptor) => acceptor.accept(incoming),
            None => {
                tracing::trace!("No {} acceptor ready, queueing request", method.name());
                slot.backlog.push_back(incoming);
            }
        }
    }
}
