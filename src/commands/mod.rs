//! Commands Module
//!
//! The table of named commands the server can run.
//!
//! ## Two kinds of command
//! - **Database commands** run on a worker thread with exclusive access to
//!   that database's store. Requests for one database never overlap.
//! - **Global commands** address no database and run on their own thread,
//!   concurrently with everything else. They may reach into the registry.
//!
//! The table is filled at startup and frozen behind an `Arc`; lookups after
//! that never lock.

/// Unwrap an argument check into an early reply
macro_rules! try_reply {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(reply) => return reply,
        }
    };
}

mod database;
mod global;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::protocol::Response;
use crate::registry::DbRegistry;
use crate::store::Store;

/// A command run against one mounted database
pub type DatabaseCommand = Arc<dyn Fn(&mut dyn Store, &[Vec<u8>]) -> Response + Send + Sync>;

/// A command that addresses no database
pub type GlobalCommand = Arc<dyn Fn(&GlobalContext, &[Vec<u8>]) -> Response + Send + Sync>;

/// What a global command may touch
pub struct GlobalContext {
    pub registry: Arc<DbRegistry>,
}

/// Immutable command table keyed by upper-case command id
#[derive(Default, Clone)]
pub struct CommandRegistry {
    database: HashMap<String, DatabaseCommand>,
    global: HashMap<String, GlobalCommand>,
}

impl CommandRegistry {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// The table with every built-in command registered
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        database::register(&mut registry);
        global::register(&mut registry);
        registry
    }

    /// Register (or replace) a database command
    pub fn register_database<F>(&mut self, id: &str, command: F) -> &mut Self
    where
        F: Fn(&mut dyn Store, &[Vec<u8>]) -> Response + Send + Sync + 'static,
    {
        self.database.insert(id.to_ascii_uppercase(), Arc::new(command));
        self
    }

    /// Register (or replace) a global command
    pub fn register_global<F>(&mut self, id: &str, command: F) -> &mut Self
    where
        F: Fn(&GlobalContext, &[Vec<u8>]) -> Response + Send + Sync + 'static,
    {
        self.global.insert(id.to_ascii_uppercase(), Arc::new(command));
        self
    }

    pub fn resolve_database(&self, id: &str) -> Option<DatabaseCommand> {
        self.database.get(id).cloned()
    }

    pub fn resolve_global(&self, id: &str) -> Option<GlobalCommand> {
        self.global.get(id).cloned()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut database: Vec<&String> = self.database.keys().collect();
        let mut global: Vec<&String> = self.global.keys().collect();
        database.sort();
        global.sort();
        f.debug_struct("CommandRegistry")
            .field("database", &database)
            .field("global", &global)
            .finish()
    }
}

/// Check the argument count, producing a BAD_REQUEST reply on mismatch
fn arity(args: &[Vec<u8>], min: usize, max: usize, usage: &str) -> Result<(), Response> {
    if args.len() < min || args.len() > max {
        return Err(Response::bad_request(&format!("usage: {}", usage)));
    }
    Ok(())
}

/// Interpret an argument as a UTF-8 string
fn utf8_arg<'a>(arg: &'a [u8], what: &str) -> Result<&'a str, Response> {
    std::str::from_utf8(arg).map_err(|_| Response::bad_request(&format!("{} must be UTF-8", what)))
}
