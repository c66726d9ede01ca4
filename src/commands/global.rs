//! Built-in global commands: database administration.

use crate::protocol::Response;

use super::{arity, utf8_arg, CommandRegistry, GlobalContext};

pub(super) fn register(registry: &mut CommandRegistry) {
    registry
        .register_global("DBCREATE", create)
        .register_global("DBDROP", drop_database)
        .register_global("DBLIST", list)
        .register_global("DBMOUNT", mount)
        .register_global("DBUMOUNT", unmount)
        .register_global("DBSTATUS", status)
        .register_global("PING", |_, _| Response::ok(Some(b"PONG".to_vec())));
}

fn create(ctx: &GlobalContext, args: &[Vec<u8>]) -> Response {
    try_reply!(arity(args, 1, 1, "DBCREATE name"));
    let name = try_reply!(utf8_arg(&args[0], "name"));
    match ctx.registry.add(name) {
        Ok(_) => Response::ok(None),
        Err(e) => Response::from(&e),
    }
}

/// Remove the database from the registry and delete its files
fn drop_database(ctx: &GlobalContext, args: &[Vec<u8>]) -> Response {
    try_reply!(arity(args, 1, 1, "DBDROP name"));
    let name = try_reply!(utf8_arg(&args[0], "name"));
    match ctx.registry.drop_database(name) {
        Ok(()) => Response::ok(None),
        Err(e) => Response::from(&e),
    }
}

fn list(ctx: &GlobalContext, args: &[Vec<u8>]) -> Response {
    try_reply!(arity(args, 0, 0, "DBLIST"));
    let names: Vec<Vec<u8>> = ctx.registry.names().into_iter().map(String::into_bytes).collect();
    Response::values(&names)
}

fn mount(ctx: &GlobalContext, args: &[Vec<u8>]) -> Response {
    try_reply!(arity(args, 1, 1, "DBMOUNT name"));
    let name = try_reply!(utf8_arg(&args[0], "name"));
    let result = ctx.registry.lookup_required(name).and_then(|worker| worker.mount());
    match result {
        Ok(()) => Response::ok(None),
        Err(e) => Response::from(&e),
    }
}

fn unmount(ctx: &GlobalContext, args: &[Vec<u8>]) -> Response {
    try_reply!(arity(args, 1, 1, "DBUMOUNT name"));
    let name = try_reply!(utf8_arg(&args[0], "name"));
    let result = ctx.registry.lookup_required(name).and_then(|worker| worker.unmount());
    match result {
        Ok(()) => Response::ok(None),
        Err(e) => Response::from(&e),
    }
}

fn status(ctx: &GlobalContext, args: &[Vec<u8>]) -> Response {
    try_reply!(arity(args, 1, 1, "DBSTATUS name"));
    let name = try_reply!(utf8_arg(&args[0], "name"));
    match ctx.registry.lookup_required(name) {
        Ok(worker) => Response::ok(Some(worker.state().as_str().as_bytes().to_vec())),
        Err(e) => Response::from(&e),
    }
}
