//! TCP Server
//!
//! Accepts connections and runs each on its own thread.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::Result;

use super::connection::Connection;
use super::reply::Dispatch;

/// How long the acceptor sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Live connections, so shutdown can close their sockets
#[derive(Default)]
struct ConnectionRegistry {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, LiveConnection>>,
}

struct LiveConnection {
    stream: TcpStream,
    thread: Option<JoinHandle<()>>,
}

/// TCP server for kvstore
pub struct Server {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    connections: Arc<ConnectionRegistry>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Bind the listen address and start accepting connections
    pub fn bind(config: &Config, dispatch: Arc<dyn Dispatch>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(ConnectionRegistry::default());

        let acceptor = {
            let shutdown = Arc::clone(&shutdown);
            let connections = Arc::clone(&connections);
            let config = config.clone();
            thread::Builder::new()
                .name("kv-acceptor".to_string())
                .spawn(move || accept_loop(listener, config, dispatch, shutdown, connections))?
        };

        tracing::info!("Listening on {}", local_addr);

        Ok(Self {
            local_addr,
            shutdown,
            connections,
            acceptor: Mutex::new(Some(acceptor)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.connections.live.lock().len()
    }

    /// Stop accepting new connections
    pub fn stop_accepting(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let acceptor = self.acceptor.lock().take();
        if let Some(handle) = acceptor {
            let _ = handle.join();
        }
        tracing::debug!("Stopped accepting on {}", self.local_addr);
    }

    /// Shut down every live socket without waiting for its thread
    ///
    /// Pending writes fail immediately afterwards, so nothing stays blocked
    /// on a slow peer.
    pub fn shutdown_sockets(&self) {
        for conn in self.connections.live.lock().values() {
            let _ = conn.stream.shutdown(Shutdown::Both);
        }
    }

    /// Shut down every live socket and join the connection threads
    pub fn close_connections(&self) {
        let live: Vec<LiveConnection> = self
            .connections
            .live
            .lock()
            .drain()
            .map(|(_, conn)| conn)
            .collect();

        for conn in &live {
            let _ = conn.stream.shutdown(Shutdown::Both);
        }
        for conn in live {
            if let Some(handle) = conn.thread {
                let _ = handle.join();
            }
        }
    }
}

fn accept_loop(
    listener: TcpListener,
    config: Config,
    dispatch: Arc<dyn Dispatch>,
    shutdown: Arc<AtomicBool>,
    connections: Arc<ConnectionRegistry>,
) {
    while !shutdown.load(Ordering::Acquire) {
        let (stream, addr) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
        };

        if shutdown.load(Ordering::Acquire) {
            break;
        }

        if connections.live.lock().len() >= config.max_connections {
            tracing::warn!(
                "Rejecting {}: connection limit {} reached",
                addr,
                config.max_connections
            );
            continue;
        }

        if let Err(e) = spawn_connection(stream, &config, &dispatch, &connections) {
            tracing::warn!("Failed to set up connection from {}: {}", addr, e);
        }
    }
}

fn spawn_connection(
    stream: TcpStream,
    config: &Config,
    dispatch: &Arc<dyn Dispatch>,
    connections: &Arc<ConnectionRegistry>,
) -> Result<()> {
    stream.set_nonblocking(false)?;

    let mut connection =
        Connection::new(stream.try_clone()?, Arc::clone(dispatch), config.serve_mode)?;
    connection.set_timeouts(config.read_timeout_ms, config.write_timeout_ms)?;

    let id = connections.next_id.fetch_add(1, Ordering::Relaxed);
    connections.live.lock().insert(
        id,
        LiveConnection {
            stream,
            thread: None,
        },
    );

    let registry = Arc::clone(connections);
    let spawned = thread::Builder::new()
        .name(format!("kv-conn-{}", id))
        .spawn(move || {
            if let Err(e) = connection.handle() {
                tracing::debug!("Connection {} closed with error: {}", id, e);
            }
            registry.live.lock().remove(&id);
        });

    let handle = match spawned {
        Ok(handle) => handle,
        Err(e) => {
            connections.live.lock().remove(&id);
            return Err(e.into());
        }
    };

    // The thread may already have finished and removed itself
    if let Some(entry) = connections.live.lock().get_mut(&id) {
        entry.thread = Some(handle);
    }

    Ok(())
}
