//! Dispatch Module
//!
//! Routes each decoded request to where it must execute.
//!
//! ## Routing
//! ```text
//!                      ┌──────────────┐
//!   frame ──decode──▶  │  Dispatcher  │
//!                      └──────┬───────┘
//!              db named       │        db empty
//!          ┌──────────────────┴──────────────────┐
//!          ▼                                     ▼
//!   registry lookup                      command table lookup
//!   (mount on demand)                            │
//!          │                                     ▼
//!          ▼                             own thread, runs
//!   worker mailbox (FIFO)                concurrently
//! ```
//!
//! Every failure stays inside the request that caused it: the client gets a
//! reply describing it and nothing else is disturbed.

mod job;

pub use job::{ClientHandle, Identity, Job, ReplySink};

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::commands::{CommandRegistry, GlobalContext};
use crate::error::ElevatorError;
use crate::protocol::{decode_request, Request, Response};
use crate::registry::DbRegistry;

/// What `dispatch` did with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Queued in a database worker's mailbox
    Enqueued,
    /// Running as a global command on its own thread
    Spawned,
    /// The frame did not decode; a BAD_REQUEST reply was sent
    Rejected,
    /// The named database is not registered; a NOT_FOUND reply was sent
    RouteMiss,
    /// No global command has that id; an ERROR reply was sent
    UnknownCommand,
    /// The worker refused the job (mount failure, unmount in progress)
    Failed,
}

/// Decodes frames and routes them to workers or global tasks
pub struct Dispatcher {
    registry: Arc<DbRegistry>,
    commands: Arc<CommandRegistry>,
    in_flight: Arc<InFlight>,
}

impl Dispatcher {
    pub fn new(registry: Arc<DbRegistry>, commands: Arc<CommandRegistry>) -> Self {
        Self {
            registry,
            commands,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Decode `frame` and route it
    pub fn dispatch(&self, frame: &[u8], client: ClientHandle) -> Dispatched {
        let request = match decode_request(frame) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Rejecting frame from {}: {}", client.identity(), e);
                client.reply(Response::from(&e));
                return Dispatched::Rejected;
            }
        };

        tracing::debug!(
            "Request {} for {:?} from {}",
            request.command,
            request.db,
            client.identity()
        );

        self.route(request, client)
    }

    /// Route an already decoded request
    pub fn route(&self, request: Request, client: ClientHandle) -> Dispatched {
        if request.is_global() {
            return self.spawn_global(request, client);
        }

        let worker = match self.registry.lookup(&request.db) {
            Some(worker) => worker,
            None => {
                tracing::debug!("No database {:?}; request not executed", request.db);
                client.reply(Response::from(&ElevatorError::DatabaseNotFound(request.db)));
                return Dispatched::RouteMiss;
            }
        };

        match worker.submit(Job::new(request, client.clone())) {
            Ok(()) => Dispatched::Enqueued,
            Err(e) => {
                tracing::warn!("Database {} refused a job: {}", worker.name(), e);
                client.reply(Response::from(&e));
                match e {
                    ElevatorError::DatabaseNotFound(_) => Dispatched::RouteMiss,
                    _ => Dispatched::Failed,
                }
            }
        }
    }

    fn spawn_global(&self, request: Request, client: ClientHandle) -> Dispatched {
        let command = match self.commands.resolve_global(&request.command) {
            Some(command) => command,
            None => {
                tracing::debug!("Unknown global command {}", request.command);
                client.reply(Response::error(&format!("unknown command: {}", request.command)));
                return Dispatched::UnknownCommand;
            }
        };

        let context = GlobalContext {
            registry: Arc::clone(&self.registry),
        };
        let guard = self.in_flight.enter();
        let reply_to = client.clone();

        let spawned = thread::Builder::new()
            .name(format!("global-{}", request.command.to_ascii_lowercase()))
            .spawn(move || {
                let _guard = guard;
                let response = command(&context, &request.args);
                Job::new(request, client).finish(response);
            });

        match spawned {
            Ok(_) => Dispatched::Spawned,
            Err(e) => {
                tracing::error!("Failed to spawn global command: {}", e);
                reply_to.reply(Response::error("server busy"));
                Dispatched::Failed
            }
        }
    }

    pub fn registry(&self) -> &Arc<DbRegistry> {
        &self.registry
    }

    /// Tracker for tasks started on behalf of this dispatcher
    pub fn in_flight(&self) -> &Arc<InFlight> {
        &self.in_flight
    }
}

// =============================================================================
// In-flight task tracking
// =============================================================================

/// Counts running dispatch and global tasks so shutdown can wait for them
#[derive(Default)]
pub struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

/// Held by a running task; dropping it marks the task finished
pub struct InFlightGuard {
    tracker: Arc<InFlight>,
}

impl InFlight {
    /// Register a task
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        *self.count.lock() += 1;
        InFlightGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Wait until no task is running; returns false on timeout
    pub fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut count = self.count.lock();
        while *count > 0 {
            match deadline {
                Some(deadline) => {
                    if self.idle.wait_until(&mut count, deadline).timed_out() {
                        return *count == 0;
                    }
                }
                None => self.idle.wait(&mut count),
            }
        }
        true
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = self.tracker.count.lock();
        *count -= 1;
        if *count == 0 {
            self.tracker.idle.notify_all();
        }
    }
}
