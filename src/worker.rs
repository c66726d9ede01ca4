//! Database Worker
//!
//! One worker per named database: a mount state machine, an unbounded FIFO
//! mailbox, and (while mounted) exactly one processing thread that owns the
//! database's store and drains the mailbox one job at a time.
//!
//! ## State Machine
//! ```text
//!            submit / mount                 open ok
//! UNMOUNTED ───────────────▶ MOUNTING ─────────────────▶ MOUNTED
//!     ▲                         │                           │
//!     │        open failed      │                           │ unmount
//!     └─────────────────────────┘                           │ (drain, close)
//!     └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! - `inner` guards the state; every transition happens under it
//! - Only one thread opens the store per attempt; others wait on `changed`
//!   and share the outcome
//! - Mailbox pushes happen under `inner`, so a push can never slip in
//!   behind the stop marker of an unmount

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::commands::CommandRegistry;
use crate::dispatch::Job;
use crate::error::{ElevatorError, Result};
use crate::protocol::{Request, Response};
use crate::store::{Store, StoreOpener};

/// Mount state of a database worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    Mounting,
    Mounted,
}

impl MountState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountState::Unmounted => "UNMOUNTED",
            MountState::Mounting => "MOUNTING",
            MountState::Mounted => "MOUNTED",
        }
    }
}

/// Mailbox items
enum Mail {
    Job(Job),
    /// Everything queued before this has been processed; close the store
    Stop,
}

struct Inner {
    state: MountState,

    /// An unmount is waiting for the mailbox to drain
    draining: bool,

    /// Removed from the registry; never mounts again
    retired: bool,

    /// Incremented on every mount attempt
    attempt: u64,

    /// Attempt number and reason of the most recent failed mount
    failed: Option<(u64, String)>,

    processor: Option<JoinHandle<()>>,
}

/// Worker for one named database
pub struct DbWorker {
    name: String,
    path: PathBuf,
    opener: Arc<dyn StoreOpener>,
    commands: Arc<CommandRegistry>,

    inner: Mutex<Inner>,
    changed: Condvar,

    mailbox_tx: Sender<Mail>,
    mailbox_rx: Receiver<Mail>,

    processed: Arc<AtomicU64>,
}

impl DbWorker {
    /// Create an unmounted worker
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        opener: Arc<dyn StoreOpener>,
        commands: Arc<CommandRegistry>,
    ) -> Self {
        let (mailbox_tx, mailbox_rx) = channel::unbounded();
        Self {
            name: name.into(),
            path: path.into(),
            opener,
            commands,
            inner: Mutex::new(Inner {
                state: MountState::Unmounted,
                draining: false,
                retired: false,
                attempt: 0,
                failed: None,
                processor: None,
            }),
            changed: Condvar::new(),
            mailbox_tx,
            mailbox_rx,
            processed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue a job, mounting the database first if needed
    ///
    /// Blocks only while a mount is in flight. Fails with `Mount` if the
    /// mount this call triggered or waited on failed, `Unavailable` while an
    /// unmount drains the mailbox, and `DatabaseNotFound` once retired.
    pub fn submit(&self, job: Job) -> Result<()> {
        let mut inner = self.inner.lock();
        loop {
            if inner.retired {
                return Err(ElevatorError::DatabaseNotFound(self.name.clone()));
            }
            let (state, draining) = (inner.state, inner.draining);
            match state {
                MountState::Mounted if draining => {
                    return Err(ElevatorError::Unavailable(format!(
                        "{} is unmounting, retry later",
                        self.name
                    )));
                }
                MountState::Mounted => {
                    self.mailbox_tx
                        .send(Mail::Job(job))
                        .map_err(|_| ElevatorError::WorkerPanicked(self.name.clone()))?;
                    return Ok(());
                }
                MountState::Mounting => self.await_mount(&mut inner)?,
                MountState::Unmounted => self.mount_locked(&mut inner)?,
            }
        }
    }

    /// Mount without queueing anything (idempotent)
    ///
    /// Refused with `Unavailable` while an unmount drains the mailbox.
    pub fn mount(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        loop {
            if inner.retired {
                return Err(ElevatorError::DatabaseNotFound(self.name.clone()));
            }
            let (state, draining) = (inner.state, inner.draining);
            match state {
                MountState::Mounted if draining => {
                    return Err(ElevatorError::Unavailable(format!(
                        "{} is unmounting, retry later",
                        self.name
                    )));
                }
                MountState::Mounted => return Ok(()),
                MountState::Mounting => self.await_mount(&mut inner)?,
                MountState::Unmounted => self.mount_locked(&mut inner)?,
            }
        }
    }

    /// Drain the mailbox, close the store and return to UNMOUNTED
    ///
    /// Jobs queued before the call are all executed. Submissions arriving
    /// during the drain are refused with `Unavailable`. A no-op when
    /// already unmounted.
    pub fn unmount(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        loop {
            let (state, draining) = (inner.state, inner.draining);
            match state {
                MountState::Unmounted => return Ok(()),
                MountState::Mounted if !draining => break,
                // Mount or another unmount in progress; wait for it to settle
                _ => self.changed.wait(&mut inner),
            }
        }

        inner.draining = true;
        let handle = inner.processor.take();
        let sent = self.mailbox_tx.send(Mail::Stop);

        let joined = MutexGuard::unlocked(&mut inner, || match handle {
            Some(h) if sent.is_ok() => h.join().map_err(|_| ()),
            _ => Err(()),
        });

        inner.state = MountState::Unmounted;
        inner.draining = false;
        self.changed.notify_all();

        tracing::info!("Database {} unmounted", self.name);
        joined.map_err(|_| ElevatorError::WorkerPanicked(self.name.clone()))
    }

    /// Permanently take the worker out of service, draining it first
    pub(crate) fn retire(&self) -> Result<()> {
        self.inner.lock().retired = true;
        self.unmount()
    }

    /// Wait for the in-flight mount attempt; fail if that attempt failed
    fn await_mount(&self, inner: &mut MutexGuard<'_, Inner>) -> Result<()> {
        let attempt = inner.attempt;
        while inner.state == MountState::Mounting && inner.attempt == attempt {
            self.changed.wait(inner);
        }
        match &inner.failed {
            Some((failed, reason)) if *failed == attempt => Err(ElevatorError::Mount {
                name: self.name.clone(),
                reason: reason.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// UNMOUNTED → MOUNTING → MOUNTED | UNMOUNTED, opening the store with
    /// the lock released
    fn mount_locked(&self, inner: &mut MutexGuard<'_, Inner>) -> Result<()> {
        inner.state = MountState::Mounting;
        inner.attempt += 1;
        let attempt = inner.attempt;

        tracing::debug!("Mounting database {} (attempt {})", self.name, attempt);
        let opened = MutexGuard::unlocked(inner, || {
            self.opener
                .open(&self.name, &self.path)
                .and_then(|store| self.spawn_processor(store))
        });

        let result = match opened {
            Ok(handle) => {
                inner.processor = Some(handle);
                inner.state = MountState::Mounted;
                inner.failed = None;
                tracing::info!("Database {} mounted", self.name);
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!("Failed to mount database {}: {}", self.name, reason);
                inner.state = MountState::Unmounted;
                inner.failed = Some((attempt, reason.clone()));
                Err(ElevatorError::Mount {
                    name: self.name.clone(),
                    reason,
                })
            }
        };

        self.changed.notify_all();
        result
    }

    fn spawn_processor(&self, store: Box<dyn Store>) -> Result<JoinHandle<()>> {
        let name = self.name.clone();
        let mailbox = self.mailbox_rx.clone();
        let commands = Arc::clone(&self.commands);
        let processed = Arc::clone(&self.processed);

        let handle = thread::Builder::new()
            .name(format!("db-{}", self.name))
            .spawn(move || process_mailbox(name, store, mailbox, commands, processed))?;
        Ok(handle)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding this database's files
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> MountState {
        self.inner.lock().state
    }

    pub fn is_retired(&self) -> bool {
        self.inner.lock().retired
    }

    /// Jobs waiting in the mailbox
    pub fn pending(&self) -> usize {
        self.mailbox_rx.len()
    }

    /// Jobs executed since the worker was created
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for DbWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbWorker")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

/// Body of the processing thread: strict FIFO, one job at a time
fn process_mailbox(
    name: String,
    mut store: Box<dyn Store>,
    mailbox: Receiver<Mail>,
    commands: Arc<CommandRegistry>,
    processed: Arc<AtomicU64>,
) {
    tracing::debug!("Processor for {} started", name);

    // recv only fails once the worker itself is gone
    while let Ok(mail) = mailbox.recv() {
        match mail {
            Mail::Job(job) => {
                let response = execute(&name, store.as_mut(), &commands, &job.request);
                job.finish(response);
                processed.fetch_add(1, Ordering::AcqRel);
            }
            Mail::Stop => break,
        }
    }

    if let Err(e) = store.close() {
        tracing::error!("Failed to close store for {}: {}", name, e);
    }
    tracing::debug!("Processor for {} stopped", name);
}

fn execute(name: &str, store: &mut dyn Store, commands: &CommandRegistry, request: &Request) -> Response {
    let command = match commands.resolve_database(&request.command) {
        Some(c) => c,
        None => {
            tracing::debug!("Unknown command {} for {}", request.command, name);
            return Response::error(&format!("unknown command: {}", request.command));
        }
    };

    match panic::catch_unwind(AssertUnwindSafe(|| command(store, &request.args))) {
        Ok(response) => response,
        Err(_) => {
            tracing::error!("Command {} panicked on {}", request.command, name);
            Response::error(&format!("command {} failed", request.command))
        }
    }
}
