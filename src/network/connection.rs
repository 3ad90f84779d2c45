//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};

use crate::config::ServeMode;
use crate::error::{KvError, Result};
use crate::protocol::{read_request_frame, write_response_frame, Method, RpcCode};

use super::reply::{Dispatch, Incoming, Outbound, ReplySink};

/// Frames that may wait for the writer thread before a sync reader blocks
const OUTBOUND_CAPACITY: usize = 1024;

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// Queue feeding the writer thread
    outbound: Sender<Outbound>,

    /// Set by the writer thread after a failed write
    broken: Arc<AtomicBool>,

    /// Writer thread, joined when the connection closes
    writer: Option<JoinHandle<()>>,

    /// Where decoded calls go
    dispatch: Arc<dyn Dispatch>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and starts the writer thread. In async mode the
    /// outbound queue is unbounded so a worker thread never blocks on a slow
    /// reader; each in-flight call has at most one frame queued.
    pub fn new(stream: TcpStream, dispatch: Arc<dyn Dispatch>, mode: ServeMode) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let write_stream = stream.try_clone()?;
        let (tx, rx) = match mode {
            ServeMode::Sync => channel::bounded(OUTBOUND_CAPACITY),
            ServeMode::Async => channel::unbounded(),
        };
        let broken = Arc::new(AtomicBool::new(false));

        let writer_peer = peer_addr.clone();
        let writer_broken = Arc::clone(&broken);
        let writer = thread::Builder::new()
            .name("kv-conn-writer".to_string())
            .spawn(move || run_writer(write_stream, rx, writer_broken, writer_peer))?;

        Ok(Self {
            reader: BufReader::new(stream),
            outbound: tx,
            broken,
            writer: Some(writer),
            dispatch,
            peer_addr,
        })
    }

    /// Configure connection timeouts
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        let stream = self.reader.get_ref();

        if read_ms > 0 {
            stream.set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            stream.set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }

        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads request frames in a loop and dispatches them. Returns when the
    /// client disconnects or an error occurs, after every reply queued for
    /// this connection has been written or dropped.
    pub fn handle(mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        let result = self.read_loop();

        // Outstanding calls keep their own senders; the writer exits once
        // the last of them is dropped.
        let Connection {
            outbound,
            writer,
            peer_addr,
            ..
        } = self;
        drop(outbound);
        if let Some(writer) = writer {
            if writer.join().is_err() {
                tracing::warn!("Writer thread for {} panicked", peer_addr);
            }
        }

        result
    }

    fn read_loop(&mut self) -> Result<()> {
        loop {
            let frame = match read_request_frame(&mut self.reader) {
                Ok(frame) => frame,
                Err(KvError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} disconnected ({:?})", self.peer_addr, e.kind());
                    return Ok(());
                }
                Err(KvError::Io(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    // Read timeout (Windows uses TimedOut instead of WouldBlock)
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            };

            let reply = ReplySink::attached(
                frame.stream_id,
                self.outbound.clone(),
                Arc::clone(&self.broken),
            );

            let Some(method) = Method::from_byte(frame.method) else {
                tracing::debug!(
                    "Unknown method 0x{:02x} from {}",
                    frame.method,
                    self.peer_addr
                );
                reply.reject(None, RpcCode::Unimplemented);
                continue;
            };

            tracing::trace!(
                "Received {} (stream {}) from {}",
                method.name(),
                frame.stream_id,
                self.peer_addr
            );

            self.dispatch.dispatch(Incoming {
                method,
                payload: frame.payload,
                reply,
                peer: self.peer_addr.clone(),
            });
        }
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
    )
}

/// Drain the outbound queue onto the socket
///
/// Every frame's notifier fires exactly once. After the first failed write
/// the socket is considered dead and the remaining frames fail immediately.
fn run_writer(
    stream: TcpStream,
    rx: Receiver<Outbound>,
    shared_broken: Arc<AtomicBool>,
    peer_addr: String,
) {
    let mut writer = BufWriter::new(stream);
    let mut broken = false;

    for outbound in rx.iter() {
        let ok = !broken
            && match write_response_frame(&mut writer, &outbound.frame) {
                Ok(()) => true,
                Err(KvError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!(
                        "Client {} disconnected before stream {} was answered",
                        peer_addr,
                        outbound.frame.stream_id()
                    );
                    broken = true;
                    false
                }
                Err(e) => {
                    tracing::warn!("Error writing to {}: {}", peer_addr, e);
                    broken = true;
                    false
                }
            };

        if broken {
            shared_broken.store(true, Ordering::Release);
        }
        if let Some(notify) = outbound.notify {
            notify(ok);
        }
    }

    tracing::trace!("Writer for {} finished", peer_addr);
}
