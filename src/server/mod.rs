//! Server Module
//!
//! Ties a [`Store`] to the network layer in one of two serving modes.
//!
//! ## Modes
//! - **Sync**: [`KvStoreService`] answers each request on the connection
//!   thread that read it.
//! - **Async**: [`AsyncDispatcher`] runs one worker per completion queue;
//!   requests are matched to pre-registered [`Call`]s that advance one step
//!   per completion.
//!
//! ## Stop order
//! 1. Stop accepting connections
//! 2. Stop matching requests and shut down live sockets
//! 3. Close the completion queues and join the workers
//! 4. Join the connection threads
//! 5. Close the store

mod call;
mod dispatcher;
mod handlers;
mod scan;
mod sync;
mod table;

pub use call::{Call, CallKind, CallState, Step};
pub use dispatcher::{AsyncDispatcher, Worker};
pub use handlers::MAX_WARMUP_SIZE;
pub use scan::{ScanSession, WriteStep};
pub use sync::KvStoreService;
pub use table::CallTable;

use std::net::SocketAddr;
use std::sync::Arc;

use crossbeam::channel::Receiver;

use crate::config::{Config, ServeMode};
use crate::error::Result;
use crate::network::{Dispatch, Server};
use crate::rpc::AsyncService;
use crate::store::Store;

/// A running kvstore server
pub struct KvServer {
    mode: ServeMode,
    store: Arc<dyn Store>,
    network: Server,
    dispatcher: Option<AsyncDispatcher>,
    stopped: bool,
}

impl KvServer {
    /// Bind the configured address and start serving `store`
    ///
    /// In async mode every worker queue is seeded before the listener
    /// accepts its first connection.
    pub fn start(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        config.validate()?;

        let (network, dispatcher) = match config.serve_mode {
            ServeMode::Sync => {
                let service: Arc<dyn Dispatch> =
                    Arc::new(KvStoreService::new(Arc::clone(&store)));
                (Server::bind(&config, service)?, None)
            }
            ServeMode::Async => {
                let mut dispatcher =
                    AsyncDispatcher::new(config.worker_threads, Arc::clone(&store));
                dispatcher.run()?;

                let service: Arc<dyn Dispatch> = dispatcher.service().clone();
                (Server::bind(&config, service)?, Some(dispatcher))
            }
        };

        tracing::info!(
            "kvstore serving on {} ({:?} mode{})",
            network.local_addr(),
            config.serve_mode,
            match &dispatcher {
                Some(d) => format!(", {} workers", d.worker_count()),
                None => String::new(),
            }
        );

        Ok(Self {
            mode: config.serve_mode,
            store,
            network,
            dispatcher,
            stopped: false,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.network.local_addr()
    }

    pub fn mode(&self) -> ServeMode {
        self.mode
    }

    /// The request matcher, in async mode
    pub fn async_service(&self) -> Option<&Arc<AsyncService>> {
        self.dispatcher.as_ref().map(|d| d.service())
    }

    pub fn connection_count(&self) -> usize {
        self.network.connection_count()
    }

    /// Serve until `shutdown` fires (or every sender is dropped), then stop
    pub fn run_until(&mut self, shutdown: &Receiver<()>) -> Result<()> {
        if shutdown.recv().is_err() {
            tracing::debug!("Shutdown channel closed");
        }
        self.stop()
    }

    /// Shut everything down and close the store. Later calls do nothing.
    pub fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        tracing::info!("Stopping kvstore server on {}", self.network.local_addr());

        self.network.stop_accepting();
        if let Some(dispatcher) = self.dispatcher.as_ref() {
            dispatcher.service().shutdown();
        }
        self.network.shutdown_sockets();

        if let Some(mut dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown();
        }
        self.network.close_connections();

        self.store.close()?;
        tracing::info!("kvstore server stopped");
        Ok(())
    }
}

impl Drop for KvServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!("Error stopping server: {}", e);
        }
    }
}
