//! Connection Handler
//!
//! Reads frames from one client and forwards them to the transport inbox
//! tagged with the client's identity. Replies travel the other way through
//! the transport's peer table, so this side never writes except to report
//! an unreadable stream.

use std::io::{BufReader, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::Sender;

use crate::dispatch::{Identity, ReplySink};
use crate::error::{ElevatorError, Result};
use crate::protocol::{read_frame, Response};
use super::transport::{Multipart, Peers};

/// Read side of a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    identity: Identity,

    /// Where complete frames are delivered
    inbox: Sender<Multipart>,

    /// Reply side; the connection unregisters itself on exit
    peers: Arc<Peers>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Set up a connection and register its write half under `identity`
    pub(crate) fn new(
        stream: TcpStream,
        identity: Identity,
        inbox: Sender<Multipart>,
        peers: Arc<Peers>,
        read_timeout_ms: u64,
    ) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Accepted sockets may inherit the listener's non-blocking mode
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        if read_timeout_ms > 0 {
            stream.set_read_timeout(Some(Duration::from_millis(read_timeout_ms)))?;
        }

        peers.register(identity.clone(), &stream)?;

        Ok(Self {
            reader: BufReader::new(stream),
            identity,
            inbox,
            peers,
            peer_addr,
        })
    }

    /// Forward frames until the client goes away or the transport closes
    pub fn run(mut self) {
        tracing::debug!("Connection {} established from {}", self.identity, self.peer_addr);

        if let Err(e) = self.forward_frames() {
            tracing::warn!("Closing connection from {}: {}", self.peer_addr, e);
        }

        self.peers.unregister(&self.identity);
    }

    fn forward_frames(&mut self) -> Result<()> {
        loop {
            let frame = match read_frame(&mut self.reader) {
                Ok(frame) => frame,
                Err(ElevatorError::Io(ref e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(ElevatorError::Io(ref e))
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
                    ) =>
                {
                    tracing::debug!("Connection reset by client {}", self.peer_addr);
                    return Ok(());
                }
                Err(ElevatorError::Io(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    // Windows reports TimedOut where Unix reports WouldBlock
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e @ ElevatorError::Protocol(_)) => {
                    // Stream position is lost; report and hang up
                    self.peers.reply(&self.identity, Response::from(&e));
                    return Err(e);
                }
                Err(e) => return Err(e),
            };

            tracing::trace!(
                "Received {} byte frame from {}",
                frame.len(),
                self.peer_addr
            );

            let message = vec![
                Bytes::copy_from_slice(self.identity.as_bytes()),
                Bytes::from(frame),
            ];
            if self.inbox.send(message).is_err() {
                tracing::debug!("Transport closed; dropping {}", self.peer_addr);
                return Ok(());
            }
        }
    }
}
