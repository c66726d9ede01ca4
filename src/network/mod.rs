//! Network Module
//!
//! Identity-tagged TCP transport, the listener loop and a blocking client.
//!
//! ## Architecture
//! - Single acceptor thread, one reader thread per connection
//! - Readers tag each frame with the connection's identity and push it to
//!   one shared inbox
//! - The listener polls the inbox and hands every message to the
//!   dispatcher on its own thread
//! - Replies are written back to whichever connection owns the identity

mod transport;
mod connection;
mod listener;
mod server;
mod client;

pub use transport::{Multipart, Transport};
pub use connection::Connection;
pub use listener::Listener;
pub use server::Server;
pub use client::Client;
