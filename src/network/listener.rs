//! Listener
//!
//! Single polling loop over the transport. Each message becomes its own
//! dispatch task so a request stuck behind a slow mount never delays the
//! ones that arrive after it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::dispatch::{ClientHandle, Dispatcher, Identity, ReplySink};
use super::transport::{Multipart, Transport};

/// Backoff after a failed poll so a dead transport cannot spin the loop
const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(50);

pub struct Listener {
    transport: Arc<Transport>,
    dispatcher: Arc<Dispatcher>,
    replier: Arc<dyn ReplySink>,
    poll_timeout: Option<Duration>,
}

impl Listener {
    /// `poll_timeout` bounds how long a shutdown request can go unnoticed;
    /// `None` polls without a timeout.
    pub fn new(
        transport: Arc<Transport>,
        dispatcher: Arc<Dispatcher>,
        poll_timeout: Option<Duration>,
    ) -> Self {
        let replier = transport.replier();
        Self {
            transport,
            dispatcher,
            replier,
            poll_timeout,
        }
    }

    /// Poll and hand off messages until `shutdown` is set
    ///
    /// Returns the number of messages handed to the dispatcher, after every
    /// dispatch task started by this loop has finished.
    pub fn run(&self, shutdown: &AtomicBool) -> u64 {
        tracing::info!("Listening on {}", self.transport.local_addr());
        let mut handed_off = 0u64;

        while !shutdown.load(Ordering::Acquire) {
            let message = match self.transport.poll(self.poll_timeout) {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Receive failed: {}", e);
                    thread::sleep(self.poll_timeout.unwrap_or(POLL_ERROR_BACKOFF));
                    continue;
                }
            };

            if self.hand_off(message) {
                handed_off += 1;
            }
        }

        tracing::info!("Listener stopping; waiting for in-flight tasks");
        self.dispatcher.in_flight().wait_idle(None);
        handed_off
    }

    /// Start a dispatch task for one `[identity, payload]` message
    fn hand_off(&self, mut message: Multipart) -> bool {
        if message.len() != 2 {
            tracing::warn!("Skipping malformed message with {} parts", message.len());
            return false;
        }

        let payload = message.pop().unwrap_or_default();
        let identity = Identity::new(message.pop().unwrap_or_default());
        let client = ClientHandle::new(identity, Arc::clone(&self.replier));

        let dispatcher = Arc::clone(&self.dispatcher);
        let guard = dispatcher.in_flight().enter();

        let spawned = thread::Builder::new()
            .name("dispatch".to_string())
            .spawn(move || {
                let _guard = guard;
                let outcome = dispatcher.dispatch(&payload, client);
                tracing::trace!("Dispatch outcome: {:?}", outcome);
            });

        match spawned {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Failed to spawn dispatch task: {}", e);
                false
            }
        }
    }
}
