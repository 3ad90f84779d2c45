//! Async dispatcher
//!
//! Owns N completion queues and N worker threads. Before any traffic
//! arrives, every queue is seeded with one acceptor per method; afterwards
//! each acceptor spawns its own replacement the moment it starts processing,
//! so every (method, queue) pair always has exactly one call waiting.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{KvError, Result};
use crate::protocol::Method;
use crate::rpc::{AsyncService, CompletionQueue, Event, Tag};
use crate::store::Store;

use super::call::{Call, CallState, Step};
use super::table::CallTable;

/// One worker: a queue, the calls it owns, and the loop that drives them
pub struct Worker {
    queue: Arc<CompletionQueue>,
    service: Arc<AsyncService>,
    store: Arc<dyn Store>,
    calls: CallTable<Call>,
}

impl Worker {
    pub fn new(
        queue: Arc<CompletionQueue>,
        service: Arc<AsyncService>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            queue,
            service,
            store,
            calls: CallTable::new(),
        }
    }

    /// Create a call for `method` and register it as this queue's acceptor
    pub fn spawn_acceptor(&mut self, method: Method) -> Tag {
        let tag = self.calls.insert(Call::new(method, Arc::clone(&self.store)));
        if let Some(call) = self.calls.get_mut(tag) {
            call.register(tag, &self.service, &self.queue);
        }
        tag
    }

    /// Seed one acceptor for every method
    pub fn seed(&mut self) {
        for method in Method::ALL {
            self.spawn_acceptor(method);
        }
    }

    /// Drive the call named by `event`
    pub fn proceed(&mut self, event: Event) {
        let Event { tag, ok } = event;

        let (state, method) = match self.calls.get(tag) {
            Some(call) => (call.state(), call.method()),
            None => {
                tracing::warn!("Queue {}: event for unknown call {:?}", self.queue.index(), tag);
                return;
            }
        };

        if !ok {
            // Shutdown bouncing an idle acceptor, or a frame that never
            // reached its peer. Either way nothing further can happen.
            tracing::trace!("{} call {:?} cancelled in {:?}", method.name(), tag, state);
            self.release(tag);
            return;
        }

        if state == CallState::Process {
            self.spawn_acceptor(method);
        }

        let step = match self.calls.get_mut(tag) {
            Some(call) => call.advance(tag, &self.queue),
            None => return,
        };

        if step == Step::Release {
            self.release(tag);
        }
    }

    fn release(&mut self, tag: Tag) {
        if let Some(mut call) = self.calls.remove(tag) {
            call.release();
        }
    }

    /// Block on the queue until it is shut down and drained
    pub fn run(mut self) {
        let index = self.queue.index();
        tracing::debug!("Worker {} started", index);

        while let Some(event) = self.queue.next() {
            self.proceed(event);
        }

        let abandoned = self.calls.len();
        for call in self.calls.values() {
            tracing::trace!("Worker {} dropping {} call in {:?}", index, call.method().name(), call.state());
        }
        tracing::debug!("Worker {} stopped ({} calls dropped)", index, abandoned);
    }

    /// Live calls owned by this worker
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn calls(&self) -> &CallTable<Call> {
        &self.calls
    }

    pub fn queue(&self) -> &Arc<CompletionQueue> {
        &self.queue
    }
}

/// Async serving engine
pub struct AsyncDispatcher {
    service: Arc<AsyncService>,
    queues: Vec<Arc<CompletionQueue>>,

    /// Seeded workers, moved onto threads by `run`
    pending: Vec<Worker>,

    threads: Vec<JoinHandle<()>>,
}

impl AsyncDispatcher {
    /// Create `worker_count` queues and seed each with one acceptor per method
    pub fn new(worker_count: usize, store: Arc<dyn Store>) -> Self {
        let service = Arc::new(AsyncService::new());

        let queues: Vec<Arc<CompletionQueue>> = (0..worker_count)
            .map(|i| Arc::new(CompletionQueue::new(i)))
            .collect();

        let pending = queues
            .iter()
            .map(|queue| {
                let mut worker =
                    Worker::new(Arc::clone(queue), Arc::clone(&service), Arc::clone(&store));
                worker.seed();
                worker
            })
            .collect();

        Self {
            service,
            queues,
            pending,
            threads: Vec::new(),
        }
    }

    /// The service connections dispatch into
    pub fn service(&self) -> &Arc<AsyncService> {
        &self.service
    }

    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    /// Start one thread per queue
    pub fn run(&mut self) -> Result<()> {
        for worker in self.pending.drain(..) {
            let index = worker.queue().index();
            let handle = thread::Builder::new()
                .name(format!("kv-worker-{}", index))
                .spawn(move || worker.run())
                .map_err(|e| KvError::Server(format!("failed to spawn worker {}: {}", index, e)))?;
            self.threads.push(handle);
        }

        tracing::info!("Async dispatcher running {} workers", self.threads.len());
        Ok(())
    }

    /// Stop matching requests, close every queue and join the workers
    pub fn shutdown(&mut self) {
        self.service.shutdown();

        for queue in &self.queues {
            queue.shutdown();
        }

        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!("A worker thread panicked");
            }
        }

        // Workers that never ran release their seeds here
        self.pending.clear();
    }
}

impl Drop for AsyncDispatcher {
    fn drop(&mut self) {
        if !self.threads.is_empty() || !self.pending.is_empty() {
            self.shutdown();
        }
    }
}
