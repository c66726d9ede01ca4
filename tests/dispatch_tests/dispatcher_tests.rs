//! Tests for Dispatcher
//!
//! These tests verify:
//! - Undecodable frames are rejected without disturbing later ones
//! - Requests for unknown databases or commands are answered, not executed
//! - Database requests are serialized per database
//! - Global commands run concurrently with each other
//! - Built-in administration commands work end to end

#[path = "../common/mod.rs"]
mod common;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use common::{registry_with, CollectingSink, MemOpener, WAIT};
use elevator::commands::CommandRegistry;
use elevator::dispatch::{Dispatched, Dispatcher};
use elevator::protocol::{decode_values, encode_request, Request, Response, Status};
use elevator::registry::DbRegistry;
use elevator::worker::MountState;

// =============================================================================
// Helper Functions
// =============================================================================

struct Fixture {
    _temp: TempDir,
    opener: Arc<MemOpener>,
    registry: Arc<DbRegistry>,
    dispatcher: Arc<Dispatcher>,
    sink: Arc<CollectingSink>,
}

fn fixture_with(commands: CommandRegistry) -> Fixture {
    let temp = TempDir::new().unwrap();
    let opener = MemOpener::new();
    let commands = Arc::new(commands);
    let registry = registry_with(&temp, Arc::clone(&opener), (*commands).clone());
    registry.add("default").unwrap();
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), commands));
    Fixture {
        _temp: temp,
        opener,
        registry,
        dispatcher,
        sink: CollectingSink::new(),
    }
}

fn fixture() -> Fixture {
    fixture_with(CommandRegistry::builtin())
}

fn frame(db: &str, command: &str, args: &[&[u8]]) -> Vec<u8> {
    let args = args.iter().map(|a| a.to_vec()).collect();
    encode_request(&Request::new(db, command, args))
}

impl Fixture {
    fn send(&self, client: u64, db: &str, command: &str, args: &[&[u8]]) -> Dispatched {
        self.dispatcher
            .dispatch(&frame(db, command, args), self.sink.client(client))
    }

    /// Send and wait for the reply
    fn call(&self, client: u64, db: &str, command: &str, args: &[&[u8]]) -> Response {
        self.send(client, db, command, args);
        self.sink.next().1
    }
}

// =============================================================================
// Rejection Tests
// =============================================================================

#[test]
fn test_undecodable_frame_is_rejected() {
    let f = fixture();

    let outcome = f.dispatcher.dispatch(&[0x00, 0x07, b'x'], f.sink.client(1));

    assert_eq!(outcome, Dispatched::Rejected);
    let (identity, reply) = f.sink.next();
    assert_eq!(identity, common::identity(1));
    assert_eq!(reply.status, Status::BadRequest);
}

#[test]
fn test_rejection_does_not_block_later_frames() {
    let f = fixture();

    f.dispatcher.dispatch(b"garbage", f.sink.client(1));
    f.sink.next();

    let reply = f.call(2, "default", "PUT", &[b"k", b"v"]);
    assert!(reply.is_ok());
    assert_eq!(f.call(2, "default", "GET", &[b"k"]).payload, Some(b"v".to_vec()));
}

#[test]
fn test_unknown_database_is_route_miss() {
    let f = fixture();

    let outcome = f.send(1, "nowhere", "PUT", &[b"k", b"v"]);

    assert_eq!(outcome, Dispatched::RouteMiss);
    assert_eq!(f.sink.next().1.status, Status::NotFound);
    assert!(!f.registry.contains("nowhere"));
    assert_eq!(f.opener.opens(), 0);
}

#[test]
fn test_unknown_global_command_is_not_executed() {
    let executed = Arc::new(AtomicUsize::new(0));
    let mut commands = CommandRegistry::builtin();
    {
        let executed = Arc::clone(&executed);
        commands.register_global("TOUCH", move |_, _| {
            executed.fetch_add(1, Ordering::SeqCst);
            Response::ok(None)
        });
    }
    let f = fixture_with(commands);

    let outcome = f.send(1, "", "TOUCHX", &[]);

    assert_eq!(outcome, Dispatched::UnknownCommand);
    let reply = f.sink.next().1;
    assert_eq!(reply.status, Status::Error);
    assert!(reply.text().contains("TOUCHX"));
    assert_eq!(executed.load(Ordering::SeqCst), 0);
}

#[test]
fn test_mount_failure_is_reported() {
    let f = fixture();
    f.opener.fail_next(1);

    let outcome = f.send(1, "default", "PING", &[]);

    assert_eq!(outcome, Dispatched::Failed);
    assert_eq!(f.sink.next().1.status, Status::Error);
    assert_eq!(f.registry.lookup("default").unwrap().state(), MountState::Unmounted);

    // The next request retries the mount
    assert_eq!(f.send(1, "default", "PING", &[]), Dispatched::Enqueued);
    assert!(f.sink.next().1.is_ok());
}

// =============================================================================
// Database Routing Tests
// =============================================================================

#[test]
fn test_increments_from_two_clients_are_serialized() {
    let f = fixture();

    assert_eq!(f.send(1, "default", "INCR", &[b"counter"]), Dispatched::Enqueued);
    let (first_client, first) = f.sink.next();
    assert_eq!(f.send(2, "default", "INCR", &[b"counter"]), Dispatched::Enqueued);
    let (second_client, second) = f.sink.next();

    assert_eq!(first_client, common::identity(1));
    assert_eq!(first.payload, Some(b"1".to_vec()));
    assert_eq!(second_client, common::identity(2));
    assert_eq!(second.payload, Some(b"2".to_vec()));
}

#[test]
fn test_concurrent_increments_lose_nothing() {
    let f = fixture();
    const CLIENTS: u64 = 16;

    let handles: Vec<_> = (0..CLIENTS)
        .map(|client| {
            let dispatcher = Arc::clone(&f.dispatcher);
            let handle = f.sink.client(client);
            thread::spawn(move || {
                dispatcher.dispatch(&frame("default", "INCR", &[b"hits"]), handle)
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Dispatched::Enqueued);
    }

    let values: BTreeSet<i64> = f
        .sink
        .take(CLIENTS as usize)
        .into_iter()
        .map(|(_, r)| r.text().parse().unwrap())
        .collect();
    assert_eq!(values, (1..=CLIENTS as i64).collect());
}

#[test]
fn test_database_commands() {
    let f = fixture();

    assert!(f.call(1, "default", "PUT", &[b"a", b"1"]).is_ok());
    assert!(f.call(1, "default", "PUT", &[b"b", b"2"]).is_ok());
    assert_eq!(f.call(1, "default", "EXISTS", &[b"a"]).payload, Some(b"1".to_vec()));
    assert_eq!(f.call(1, "default", "EXISTS", &[b"zz"]).payload, Some(b"0".to_vec()));

    let mget = f.call(1, "default", "MGET", &[b"a", b"missing", b"b"]);
    let items = decode_values(&mget.payload.unwrap()).unwrap();
    assert_eq!(items, vec![b"1".to_vec(), Vec::new(), b"2".to_vec()]);

    let range = f.call(1, "default", "RANGE", &[b"a", b"b"]);
    let items = decode_values(&range.payload.unwrap()).unwrap();
    assert_eq!(items, vec![b"a".to_vec(), b"1".to_vec(), b"b".to_vec(), b"2".to_vec()]);

    assert!(f.call(1, "default", "DELETE", &[b"a"]).is_ok());
    assert_eq!(f.call(1, "default", "DELETE", &[b"a"]).status, Status::NotFound);
    assert_eq!(f.call(1, "default", "GET", &[b"a"]).status, Status::NotFound);

    assert_eq!(f.call(1, "default", "INCR", &[b"b", b"-5"]).payload, Some(b"-3".to_vec()));
    assert_eq!(f.call(1, "default", "GET", &[b"b"]).payload, Some(b"-3".to_vec()));
}

#[test]
fn test_database_command_argument_errors() {
    let f = fixture();

    assert_eq!(f.call(1, "default", "GET", &[]).status, Status::BadRequest);
    assert!(f.call(1, "default", "PUT", &[b"n", b"text"]).is_ok());
    assert_eq!(f.call(1, "default", "INCR", &[b"n"]).status, Status::BadRequest);
}

// =============================================================================
// Global Command Tests
// =============================================================================

#[test]
fn test_global_commands_run_concurrently() {
    let arrived = Arc::new(AtomicUsize::new(0));
    let mut commands = CommandRegistry::builtin();
    {
        let arrived = Arc::clone(&arrived);
        commands.register_global("RENDEZVOUS", move |_, _| {
            arrived.fetch_add(1, Ordering::SeqCst);
            let deadline = Instant::now() + WAIT;
            while arrived.load(Ordering::SeqCst) < 2 {
                if Instant::now() > deadline {
                    return Response::error("alone");
                }
                thread::sleep(Duration::from_millis(1));
            }
            Response::ok(None)
        });
    }
    let f = fixture_with(commands);

    assert_eq!(f.send(1, "", "RENDEZVOUS", &[]), Dispatched::Spawned);
    assert_eq!(f.send(2, "", "RENDEZVOUS", &[]), Dispatched::Spawned);

    let replies = f.sink.take(2);
    assert!(replies.iter().all(|(_, r)| r.is_ok()));
    assert!(f.dispatcher.in_flight().wait_idle(Some(WAIT)));
    assert_eq!(f.dispatcher.in_flight().count(), 0);
}

#[test]
fn test_database_administration() {
    let f = fixture();

    assert!(f.call(1, "", "DBCREATE", &[b"orders"]).is_ok());
    assert_eq!(f.call(1, "", "DBCREATE", &[b"orders"]).status, Status::Error);
    assert_eq!(f.call(1, "", "DBCREATE", &[b"bad name"]).status, Status::BadRequest);

    let list = f.call(1, "", "DBLIST", &[]);
    let names = decode_values(&list.payload.unwrap()).unwrap();
    assert_eq!(names, vec![b"default".to_vec(), b"orders".to_vec()]);

    assert_eq!(f.call(1, "", "DBSTATUS", &[b"orders"]).payload, Some(b"UNMOUNTED".to_vec()));
    assert!(f.call(1, "", "DBMOUNT", &[b"orders"]).is_ok());
    assert_eq!(f.call(1, "", "DBSTATUS", &[b"orders"]).payload, Some(b"MOUNTED".to_vec()));

    assert!(f.call(2, "orders", "PUT", &[b"k", b"v"]).is_ok());
    assert!(f.call(1, "", "DBUMOUNT", &[b"orders"]).is_ok());
    assert_eq!(f.call(1, "", "DBSTATUS", &[b"orders"]).payload, Some(b"UNMOUNTED".to_vec()));

    assert!(f.call(1, "", "DBDROP", &[b"orders"]).is_ok());
    assert_eq!(f.call(2, "orders", "GET", &[b"k"]).status, Status::NotFound);
    assert_eq!(f.call(1, "", "DBSTATUS", &[b"orders"]).status, Status::NotFound);
}

#[test]
fn test_global_ping() {
    let f = fixture();
    assert_eq!(f.call(1, "", "PING", &[]).payload, Some(b"PONG".to_vec()));
}
