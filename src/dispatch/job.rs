//! Units of work handed from the dispatcher to workers and global tasks.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::protocol::{Request, Response};

/// Opaque sender token supplied by the transport
///
/// Retained verbatim and reattached to the reply.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity(Bytes);

impl Identity {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Delivers replies back through the transport
pub trait ReplySink: Send + Sync {
    fn reply(&self, identity: &Identity, response: Response);
}

/// Back-reference to the client that sent a request
#[derive(Clone)]
pub struct ClientHandle {
    identity: Identity,
    sink: Arc<dyn ReplySink>,
}

impl ClientHandle {
    pub fn new(identity: Identity, sink: Arc<dyn ReplySink>) -> Self {
        Self { identity, sink }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Send `response` to this client
    pub fn reply(&self, response: Response) {
        self.sink.reply(&self.identity, response);
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("identity", &self.identity)
            .finish()
    }
}

/// A decoded request together with the client waiting for its reply
///
/// Lives from decode until its command has run and the reply is sent.
#[derive(Debug, Clone)]
pub struct Job {
    pub request: Request,
    pub client: ClientHandle,
}

impl Job {
    pub fn new(request: Request, client: ClientHandle) -> Self {
        Self { request, client }
    }

    /// Reply to the originating client, consuming the job
    pub fn finish(self, response: Response) {
        self.client.reply(response);
    }
}
