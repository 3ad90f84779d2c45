//! Completion queue
//!
//! One per worker thread: an unbounded FIFO of ready tags.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;

use crate::network::Notify;

/// Handle naming one call in a worker's call table
///
/// The generation distinguishes a live call from an earlier occupant of the
/// same slot, so a late completion for a released call is detected instead of
/// reaching whichever call reused the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl Tag {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// A ready notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub tag: Tag,

    /// `false` when the operation could not complete (peer gone, shutdown)
    pub ok: bool,
}

/// Thread-safe ready-queue of completion tags
pub struct CompletionQueue {
    index: usize,

    /// Taken exactly once by `shutdown`; posting afterwards fails
    tx: RwLock<Option<Sender<Event>>>,

    rx: Receiver<Event>,
}

impl CompletionQueue {
    pub fn new(index: usize) -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            index,
            tx: RwLock::new(Some(tx)),
            rx,
        }
    }

    /// Position of this queue among the dispatcher's queues
    pub fn index(&self) -> usize {
        self.index
    }

    /// Enqueue a ready tag. Returns `false` once the queue is shut down.
    pub fn post(&self, tag: Tag, ok: bool) -> bool {
        match &*self.tx.read() {
            Some(tx) => tx.send(Event { tag, ok }).is_ok(),
            None => {
                tracing::trace!("Queue {} closed, dropping event for {:?}", self.index, tag);
                false
            }
        }
    }

    /// Block until the next event. Returns `None` once the queue is shut
    /// down and every event posted before that has been drained.
    pub fn next(&self) -> Option<Event> {
        self.rx.recv().ok()
    }

    /// Events waiting to be drained
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Close the queue. Only the first call has an effect.
    pub fn shutdown(&self) -> bool {
        let closed = self.tx.write().take().is_some();
        if closed {
            tracing::debug!("Completion queue {} shut down", self.index);
        }
        closed
    }

    pub fn is_shutdown(&self) -> bool {
        self.tx.read().is_none()
    }

    /// Notifier that posts `tag` to this queue when an outbound frame completes
    pub fn notifier(self: &Arc<Self>, tag: Tag) -> Notify {
        let queue = Arc::clone(self);
        Box::new(move |ok| {
            queue.post(tag, ok);
        })
    }
}
