//! Identity-tagged transport
//!
//! A TCP endpoint that behaves like a router socket: every inbound frame
//! arrives as a two-part message `[identity, payload]`, and a reply is
//! addressed by handing the same identity back.

use std::collections::HashMap;
use std::io::{BufWriter, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::config::Config;
use crate::dispatch::{Identity, ReplySink};
use crate::error::{ElevatorError, Result};
use crate::protocol::{encode_response, write_frame, Response};
use super::connection::Connection;

/// One inbound message: `[identity, payload]`
pub type Multipart = Vec<Bytes>;

/// Pause between accept attempts when nothing is pending
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Bound transport endpoint
pub struct Transport {
    local_addr: SocketAddr,
    inbox: Receiver<Multipart>,
    peers: Arc<Peers>,
    shutdown: Arc<AtomicBool>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    /// Bind `config.listen_addr` and start accepting connections
    ///
    /// Failure to bind is reported as `Transport` and is meant to be fatal.
    pub fn bind(config: &Config) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            ElevatorError::Transport(format!("cannot bind {}: {}", config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (inbox_tx, inbox) = channel::unbounded();
        let peers = Arc::new(Peers::new(config));
        let shutdown = Arc::new(AtomicBool::new(false));

        let acceptor = {
            let peers = Arc::clone(&peers);
            let shutdown = Arc::clone(&shutdown);
            let limits = Limits::from(config);
            thread::Builder::new()
                .name("acceptor".to_string())
                .spawn(move || accept_loop(listener, inbox_tx, peers, shutdown, limits))?
        };

        tracing::info!("Transport bound to {}", local_addr);

        Ok(Self {
            local_addr,
            inbox,
            peers,
            shutdown,
            acceptor: Mutex::new(Some(acceptor)),
        })
    }

    /// Wait for the next message
    ///
    /// `None` timeout blocks until input arrives. Returns `Ok(None)` when the
    /// timeout elapses and `Transport` once the endpoint is closed and drained.
    pub fn poll(&self, timeout: Option<Duration>) -> Result<Option<Multipart>> {
        let closed = || ElevatorError::Transport("transport closed".to_string());
        match timeout {
            None => self.inbox.recv().map(Some).map_err(|_| closed()),
            Some(timeout) => match self.inbox.recv_timeout(timeout) {
                Ok(message) => Ok(Some(message)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(closed()),
            },
        }
    }

    /// Reply path for identities received on this transport
    pub fn replier(&self) -> Arc<dyn ReplySink> {
        Arc::clone(&self.peers) as Arc<dyn ReplySink>
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and disconnect every peer
    pub fn close(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.acceptor.lock().take() {
            let _ = handle.join();
        }
        self.peers.close_all();
        tracing::info!("Transport on {} closed", self.local_addr);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Acceptor
// =============================================================================

#[derive(Clone, Copy)]
struct Limits {
    max_connections: usize,
    read_timeout_ms: u64,
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        Self {
            max_connections: config.max_connections,
            read_timeout_ms: config.read_timeout_ms,
        }
    }
}

fn accept_loop(
    listener: TcpListener,
    inbox: Sender<Multipart>,
    peers: Arc<Peers>,
    shutdown: Arc<AtomicBool>,
    limits: Limits,
) {
    let mut next_id: u64 = 1;

    while !shutdown.load(Ordering::Acquire) {
        let (stream, addr) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_BACKOFF);
                continue;
            }
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                thread::sleep(ACCEPT_BACKOFF);
                continue;
            }
        };

        if peers.len() >= limits.max_connections {
            tracing::warn!(
                "Refusing {}: connection limit {} reached",
                addr,
                limits.max_connections
            );
            let _ = stream.shutdown(Shutdown::Both);
            continue;
        }

        let identity = Identity::new(Bytes::copy_from_slice(&next_id.to_be_bytes()));
        next_id += 1;

        let connection = match Connection::new(
            stream,
            identity,
            inbox.clone(),
            Arc::clone(&peers),
            limits.read_timeout_ms,
        ) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to set up connection from {}: {}", addr, e);
                continue;
            }
        };

        let spawned = thread::Builder::new()
            .name(format!("conn-{}", addr))
            .spawn(move || connection.run());
        if let Err(e) = spawned {
            tracing::warn!("Failed to spawn reader for {}: {}", addr, e);
        }
    }
}

// =============================================================================
// Peers (reply side)
// =============================================================================

struct Peer {
    /// Handle used to force the connection closed
    control: TcpStream,
    writer: Arc<Mutex<BufWriter<TcpStream>>>,
}

/// Write halves of every live connection, keyed by identity
pub(crate) struct Peers {
    peers: Mutex<HashMap<Identity, Peer>>,
    write_timeout_ms: u64,
}

impl Peers {
    fn new(config: &Config) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            write_timeout_ms: config.write_timeout_ms,
        }
    }

    pub(crate) fn register(&self, identity: Identity, stream: &TcpStream) -> Result<()> {
        let write_stream = stream.try_clone()?;
        if self.write_timeout_ms > 0 {
            write_stream.set_write_timeout(Some(Duration::from_millis(self.write_timeout_ms)))?;
        }
        let peer = Peer {
            control: stream.try_clone()?,
            writer: Arc::new(Mutex::new(BufWriter::new(write_stream))),
        };
        self.peers.lock().insert(identity, peer);
        Ok(())
    }

    pub(crate) fn unregister(&self, identity: &Identity) {
        self.peers.lock().remove(identity);
    }

    fn len(&self) -> usize {
        self.peers.lock().len()
    }

    fn close_all(&self) {
        for (_, peer) in self.peers.lock().drain() {
            let _ = peer.control.shutdown(Shutdown::Both);
        }
    }
}

impl ReplySink for Peers {
    fn reply(&self, identity: &Identity, response: Response) {
        let writer = self.peers.lock().get(identity).map(|p| Arc::clone(&p.writer));

        let writer = match writer {
            Some(w) => w,
            None => {
                tracing::debug!("Dropping reply for disconnected client {}", identity);
                return;
            }
        };

        let body = encode_response(&response);
        let mut writer = writer.lock();
        if let Err(e) = write_frame(&mut *writer, &body) {
            tracing::debug!("Failed to reply to {}: {}", identity, e);
        }
    }
}
