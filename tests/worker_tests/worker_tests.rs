//! Tests for DbWorker
//!
//! These tests verify:
//! - Jobs for one database run in arrival order and never overlap
//! - Mounting is single-flight and idempotent
//! - A failed mount is reported to every waiter, and a later attempt retries
//! - Unmount drains the mailbox before closing the store
//! - A panicking command only fails its own request

#[path = "../common/mod.rs"]
mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use common::{CollectingSink, MemOpener};
use elevator::commands::CommandRegistry;
use elevator::dispatch::Job;
use elevator::error::ElevatorError;
use elevator::protocol::{Request, Response, Status};
use elevator::store::StoreOpener;
use elevator::worker::{DbWorker, MountState};

// =============================================================================
// Helper Functions
// =============================================================================

fn worker_with(opener: &Arc<MemOpener>, commands: CommandRegistry) -> (TempDir, Arc<DbWorker>) {
    let temp_dir = TempDir::new().unwrap();
    let worker = DbWorker::new(
        "db",
        temp_dir.path().join("db"),
        Arc::clone(opener) as Arc<dyn StoreOpener>,
        Arc::new(commands),
    );
    (temp_dir, Arc::new(worker))
}

fn builtin_worker(opener: &Arc<MemOpener>) -> (TempDir, Arc<DbWorker>) {
    worker_with(opener, CommandRegistry::builtin())
}

fn job(sink: &Arc<CollectingSink>, client: u64, command: &str, args: &[&[u8]]) -> Job {
    let args = args.iter().map(|a| a.to_vec()).collect();
    Job::new(Request::new("db", command, args), sink.client(client))
}

/// Commands that sleep while holding the store, to expose overlap
fn slow_commands(sleep: Duration) -> CommandRegistry {
    let mut commands = CommandRegistry::builtin();
    commands.register_database("SLOW", move |store, args| {
        thread::sleep(sleep);
        match store.put(&args[0], b"done") {
            Ok(()) => Response::ok(None),
            Err(e) => Response::from(&e),
        }
    });
    commands
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_jobs_run_in_order_without_overlap() {
    let log: Arc<Mutex<Vec<(u8, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    let active = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let mut commands = CommandRegistry::new();
    {
        let (log, active, overlaps) = (Arc::clone(&log), Arc::clone(&active), Arc::clone(&overlaps));
        commands.register_database("RECORD", move |_, args| {
            if active.swap(true, Ordering::SeqCst) {
                overlaps.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_micros(200));
            let seq = u32::from_be_bytes([args[1][0], args[1][1], args[1][2], args[1][3]]);
            log.lock().push((args[0][0], seq));
            active.store(false, Ordering::SeqCst);
            Response::ok(None)
        });
    }

    let opener = MemOpener::new();
    let (_temp, worker) = worker_with(&opener, commands);
    let sink = CollectingSink::new();

    const SENDERS: u8 = 4;
    const PER_SENDER: u32 = 50;

    let handles: Vec<_> = (0..SENDERS)
        .map(|sender| {
            let worker = Arc::clone(&worker);
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                for seq in 0..PER_SENDER {
                    let job = job(&sink, sender as u64, "RECORD", &[&[sender], &seq.to_be_bytes()]);
                    worker.submit(job).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let replies = sink.take(SENDERS as usize * PER_SENDER as usize);
    assert!(replies.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);

    let log = log.lock();
    for sender in 0..SENDERS {
        let seqs: Vec<u32> = log.iter().filter(|(s, _)| *s == sender).map(|(_, q)| *q).collect();
        assert_eq!(seqs, (0..PER_SENDER).collect::<Vec<_>>());
    }
    assert_eq!(worker.processed(), (SENDERS as u64) * (PER_SENDER as u64));
}

#[test]
fn test_replies_reach_the_submitting_client() {
    let opener = MemOpener::new();
    let (_temp, worker) = builtin_worker(&opener);
    let sink = CollectingSink::new();

    worker.submit(job(&sink, 7, "PUT", &[b"k", b"v"])).unwrap();
    worker.submit(job(&sink, 9, "GET", &[b"k"])).unwrap();

    let (first, put) = sink.next();
    let (second, get) = sink.next();
    assert_eq!(first, common::identity(7));
    assert!(put.is_ok());
    assert_eq!(second, common::identity(9));
    assert_eq!(get.payload, Some(b"v".to_vec()));
}

// =============================================================================
// Mount Tests
// =============================================================================

#[test]
fn test_submit_mounts_on_demand() {
    let opener = MemOpener::new();
    let (_temp, worker) = builtin_worker(&opener);
    let sink = CollectingSink::new();

    assert_eq!(worker.state(), MountState::Unmounted);
    worker.submit(job(&sink, 1, "PING", &[])).unwrap();

    assert_eq!(sink.next().1.payload, Some(b"PONG".to_vec()));
    assert_eq!(worker.state(), MountState::Mounted);
    assert_eq!(opener.opens(), 1);
}

#[test]
fn test_concurrent_mounts_open_once() {
    let opener = MemOpener::new();
    opener.set_delay(Duration::from_millis(100));
    let (_temp, worker) = builtin_worker(&opener);

    const CALLERS: usize = 8;
    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let worker = Arc::clone(&worker);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                worker.mount()
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(opener.opens(), 1);
    assert_eq!(worker.state(), MountState::Mounted);

    // Mounting a mounted worker does nothing
    worker.mount().unwrap();
    assert_eq!(opener.opens(), 1);
}

#[test]
fn test_concurrent_submits_during_mount_open_once() {
    let opener = MemOpener::new();
    opener.set_delay(Duration::from_millis(100));
    let (_temp, worker) = builtin_worker(&opener);
    let sink = CollectingSink::new();

    const CALLERS: usize = 6;
    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let worker = Arc::clone(&worker);
            let barrier = Arc::clone(&barrier);
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                barrier.wait();
                worker.submit(job(&sink, i as u64, "PING", &[]))
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(sink.take(CALLERS).len(), CALLERS);
    assert_eq!(opener.opens(), 1);
}

#[test]
fn test_failed_mount_is_shared_then_retried() {
    let opener = MemOpener::new();
    opener.set_delay(Duration::from_millis(300));
    opener.fail_next(1);
    let (_temp, worker) = builtin_worker(&opener);

    const CALLERS: usize = 4;
    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let worker = Arc::clone(&worker);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                worker.mount()
            })
        })
        .collect();

    for handle in handles {
        match handle.join().unwrap() {
            Err(ElevatorError::Mount { name, reason }) => {
                assert_eq!(name, "db");
                assert!(reason.contains("injected failure"));
            }
            other => panic!("expected mount failure, got {:?}", other),
        }
    }
    assert_eq!(opener.opens(), 1);
    assert_eq!(worker.state(), MountState::Unmounted);

    opener.set_delay(Duration::ZERO);
    worker.mount().unwrap();
    assert_eq!(opener.opens(), 2);
    assert_eq!(worker.state(), MountState::Mounted);
}

#[test]
fn test_failed_mount_rejects_the_job() {
    let opener = MemOpener::new();
    opener.fail_next(1);
    let (_temp, worker) = builtin_worker(&opener);
    let sink = CollectingSink::new();

    let result = worker.submit(job(&sink, 1, "PING", &[]));

    assert!(matches!(result, Err(ElevatorError::Mount { .. })));
    assert!(sink.is_empty());
    assert_eq!(worker.processed(), 0);
}

// =============================================================================
// Unmount Tests
// =============================================================================

#[test]
fn test_unmount_when_unmounted_is_noop() {
    let opener = MemOpener::new();
    let (_temp, worker) = builtin_worker(&opener);

    worker.unmount().unwrap();
    assert_eq!(worker.state(), MountState::Unmounted);
    assert_eq!(opener.opens(), 0);
}

#[test]
fn test_unmount_drains_queued_jobs() {
    let opener = MemOpener::new();
    let (_temp, worker) = worker_with(&opener, slow_commands(Duration::from_millis(10)));
    let sink = CollectingSink::new();

    for i in 0..10u8 {
        worker.submit(job(&sink, 1, "SLOW", &[&[b'k', b'0' + i]])).unwrap();
    }
    worker.unmount().unwrap();

    assert_eq!(worker.state(), MountState::Unmounted);
    assert_eq!(worker.pending(), 0);
    assert_eq!(worker.processed(), 10);
    assert_eq!(sink.take(10).len(), 10);

    // The store was closed after the last job ran
    assert_eq!(opener.shelved("db", b"k9"), Some(b"done".to_vec()));
}

#[test]
fn test_submit_while_draining_is_unavailable() {
    let opener = MemOpener::new();
    let (_temp, worker) = worker_with(&opener, slow_commands(Duration::from_millis(300)));
    let sink = CollectingSink::new();

    worker.submit(job(&sink, 1, "SLOW", &[b"first"])).unwrap();

    let unmounting = {
        let worker = Arc::clone(&worker);
        thread::spawn(move || worker.unmount())
    };
    thread::sleep(Duration::from_millis(100));

    let refused = worker.submit(job(&sink, 2, "PUT", &[b"late", b"x"]));
    assert!(matches!(refused, Err(ElevatorError::Unavailable(_))));

    unmounting.join().unwrap().unwrap();
    assert!(sink.next().1.is_ok());
    assert_eq!(worker.state(), MountState::Unmounted);

    // Afterwards the database mounts again on demand
    worker.submit(job(&sink, 2, "GET", &[b"first"])).unwrap();
    assert_eq!(sink.next().1.payload, Some(b"done".to_vec()));
    assert_eq!(opener.opens(), 2);
}

#[test]
fn test_mount_while_draining_is_unavailable() {
    let opener = MemOpener::new();
    let (_temp, worker) = worker_with(&opener, slow_commands(Duration::from_millis(300)));
    let sink = CollectingSink::new();

    worker.submit(job(&sink, 1, "SLOW", &[b"first"])).unwrap();

    let unmounting = {
        let worker = Arc::clone(&worker);
        thread::spawn(move || worker.unmount())
    };
    thread::sleep(Duration::from_millis(100));

    let refused = worker.mount();
    assert!(matches!(refused, Err(ElevatorError::Unavailable(_))));

    unmounting.join().unwrap().unwrap();
    assert!(sink.next().1.is_ok());
    assert_eq!(worker.state(), MountState::Unmounted);

    // Once the drain settles an explicit mount succeeds and sticks
    worker.mount().unwrap();
    assert_eq!(worker.state(), MountState::Mounted);
    assert_eq!(opener.opens(), 2);
}

#[test]
fn test_data_survives_remount() {
    let opener = MemOpener::new();
    let (_temp, worker) = builtin_worker(&opener);
    let sink = CollectingSink::new();

    worker.submit(job(&sink, 1, "PUT", &[b"key", b"value"])).unwrap();
    sink.next();
    worker.unmount().unwrap();

    worker.submit(job(&sink, 1, "GET", &[b"key"])).unwrap();
    assert_eq!(sink.next().1.payload, Some(b"value".to_vec()));
}

// =============================================================================
// Failure Containment Tests
// =============================================================================

#[test]
fn test_panicking_command_fails_only_its_request() {
    let opener = MemOpener::new();
    let mut commands = CommandRegistry::builtin();
    commands.register_database("BOOM", |_, _| panic!("boom"));
    let (_temp, worker) = worker_with(&opener, commands);
    let sink = CollectingSink::new();

    worker.submit(job(&sink, 1, "BOOM", &[])).unwrap();
    worker.submit(job(&sink, 2, "PUT", &[b"k", b"v"])).unwrap();

    let replies = sink.take(2);
    assert_eq!(replies[0].1.status, Status::Error);
    assert!(replies[1].1.is_ok());
    assert_eq!(worker.state(), MountState::Mounted);
}

#[test]
fn test_unknown_command_gets_error_reply() {
    let opener = MemOpener::new();
    let (_temp, worker) = builtin_worker(&opener);
    let sink = CollectingSink::new();

    worker.submit(job(&sink, 1, "NOPE", &[])).unwrap();

    let (_, reply) = sink.next();
    assert_eq!(reply.status, Status::Error);
    assert!(reply.text().contains("NOPE"));
}
