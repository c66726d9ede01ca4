//! # Elevator
//!
//! Front-end dispatcher for a multi-tenant storage server:
//! - One lazily mounted worker per named database, with a strict FIFO mailbox
//! - Global commands that address no database run fully concurrently
//! - A durable registry of database names
//! - Write-ahead logging and snapshots in the per-database engine
//! - Identity-tagged TCP transport
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Transport + Listener                          │
//! │         ([identity, payload] per inbound frame)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ one task per message
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Dispatcher                               │
//! │              (decode, route, reply on error)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Registry   │          │   Global    │
//!   │  → Worker   │          │  command    │
//!   │  (mailbox)  │          │  (thread)   │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │   Engine    │
//!   │ WAL + Table │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;
pub mod store;

pub mod protocol;
pub mod commands;
pub mod worker;
pub mod registry;
pub mod dispatch;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ElevatorError, Result};
pub use config::Config;
pub use engine::{Engine, EngineOptions};
pub use store::{EngineOpener, Store, StoreOpener};
pub use commands::CommandRegistry;
pub use registry::DbRegistry;
pub use worker::{DbWorker, MountState};
pub use dispatch::Dispatcher;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Elevator
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
