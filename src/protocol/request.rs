//! Request definitions
//!
//! Represents decoded client requests.

/// A decoded client request
///
/// Immutable once decoded. The client that sent it travels alongside in a
/// [`Job`](crate::dispatch::Job), not inside the request itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Target database; empty means "no specific database"
    pub db: String,

    /// Command identifier, upper case
    pub command: String,

    /// Command arguments
    pub args: Vec<Vec<u8>>,
}

impl Request {
    /// Build a request addressed to database `db`
    pub fn new(db: impl Into<String>, command: impl Into<String>, args: Vec<Vec<u8>>) -> Self {
        Self {
            db: db.into(),
            command: command.into().to_ascii_uppercase(),
            args,
        }
    }

    /// Build a request that targets no database
    pub fn global(command: impl Into<String>, args: Vec<Vec<u8>>) -> Self {
        Self::new(String::new(), command, args)
    }

    /// Whether this request runs as a global command
    pub fn is_global(&self) -> bool {
        self.db.is_empty()
    }
}
