//! Built-in database commands.

use crate::protocol::Response;
use crate::store::Store;

use super::{arity, CommandRegistry};

pub(super) fn register(registry: &mut CommandRegistry) {
    registry
        .register_database("GET", get)
        .register_database("PUT", put)
        .register_database("DELETE", delete)
        .register_database("EXISTS", exists)
        .register_database("MGET", mget)
        .register_database("INCR", incr)
        .register_database("RANGE", range)
        .register_database("PING", |_, _| Response::ok(Some(b"PONG".to_vec())));
}

fn store_error(err: crate::error::ElevatorError) -> Response {
    Response::from(&err)
}

fn get(store: &mut dyn Store, args: &[Vec<u8>]) -> Response {
    try_reply!(arity(args, 1, 1, "GET key"));
    match store.get(&args[0]) {
        Ok(Some(value)) => Response::ok(Some(value)),
        Ok(None) => Response::not_found(),
        Err(e) => store_error(e),
    }
}

fn put(store: &mut dyn Store, args: &[Vec<u8>]) -> Response {
    try_reply!(arity(args, 2, 2, "PUT key value"));
    match store.put(&args[0], &args[1]) {
        Ok(()) => Response::ok(None),
        Err(e) => store_error(e),
    }
}

fn delete(store: &mut dyn Store, args: &[Vec<u8>]) -> Response {
    try_reply!(arity(args, 1, 1, "DELETE key"));
    match store.delete(&args[0]) {
        Ok(true) => Response::ok(None),
        Ok(false) => Response::not_found(),
        Err(e) => store_error(e),
    }
}

fn exists(store: &mut dyn Store, args: &[Vec<u8>]) -> Response {
    try_reply!(arity(args, 1, 1, "EXISTS key"));
    match store.get(&args[0]) {
        Ok(found) => Response::ok(Some(if found.is_some() { b"1" } else { b"0" }.to_vec())),
        Err(e) => store_error(e),
    }
}

/// Missing keys come back as empty items so positions line up with the keys
fn mget(store: &mut dyn Store, args: &[Vec<u8>]) -> Response {
    try_reply!(arity(args, 1, usize::MAX, "MGET key [key ...]"));
    let mut values = Vec::with_capacity(args.len());
    for key in args {
        match store.get(key) {
            Ok(value) => values.push(value.unwrap_or_default()),
            Err(e) => return store_error(e),
        }
    }
    Response::values(&values)
}

/// Add `delta` (default 1) to the decimal integer at `key`; a missing key counts as 0
fn incr(store: &mut dyn Store, args: &[Vec<u8>]) -> Response {
    try_reply!(arity(args, 1, 2, "INCR key [delta]"));

    let delta = match args.get(1) {
        Some(raw) => try_reply!(parse_i64(raw, "delta")),
        None => 1,
    };

    let current = match store.get(&args[0]) {
        Ok(Some(raw)) => try_reply!(parse_i64(&raw, "stored value")),
        Ok(None) => 0,
        Err(e) => return store_error(e),
    };

    let next = match current.checked_add(delta) {
        Some(n) => n,
        None => return Response::error("increment would overflow"),
    };

    let encoded = next.to_string().into_bytes();
    match store.put(&args[0], &encoded) {
        Ok(()) => Response::ok(Some(encoded)),
        Err(e) => store_error(e),
    }
}

/// Alternating key/value items for `start <= key <= end`
fn range(store: &mut dyn Store, args: &[Vec<u8>]) -> Response {
    try_reply!(arity(args, 2, 2, "RANGE start end"));
    match store.range(&args[0], &args[1]) {
        Ok(pairs) => {
            let items: Vec<Vec<u8>> = pairs.into_iter().flat_map(|(k, v)| [k, v]).collect();
            Response::values(&items)
        }
        Err(e) => store_error(e),
    }
}

fn parse_i64(raw: &[u8], what: &str) -> Result<i64, Response> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| Response::bad_request(&format!("{} is not an integer", what)))
}
