//! TCP Server
//!
//! Wires the transport, dispatcher and listener together and owns the
//! shutdown sequence.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::commands::CommandRegistry;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::registry::DbRegistry;
use super::listener::Listener;
use super::transport::Transport;

/// TCP server for Elevator
pub struct Server {
    transport: Arc<Transport>,
    listener: Listener,
    registry: Arc<DbRegistry>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Bind the transport; the registry should already be loaded
    pub fn bind(
        config: &Config,
        registry: Arc<DbRegistry>,
        commands: Arc<CommandRegistry>,
    ) -> Result<Self> {
        let transport = Arc::new(Transport::bind(config)?);
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), commands));
        let listener = Listener::new(Arc::clone(&transport), dispatcher, config.poll_timeout());

        Ok(Self {
            transport,
            listener,
            registry,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Flag that stops `run` once set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the server to shut down gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Serve until shutdown is requested (blocking)
    ///
    /// On the way out: the listener stops polling and waits for its dispatch
    /// tasks, every worker drains its mailbox and closes its store, then the
    /// transport closes.
    pub fn run(self) -> Result<()> {
        let handled = self.listener.run(&self.shutdown);
        tracing::info!("Listener stopped after {} messages", handled);

        let drained = self.registry.shutdown();
        self.transport.close();

        drained?;
        tracing::info!("Server shut down cleanly");
        Ok(())
    }
}
