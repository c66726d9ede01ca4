//! Storage Module
//!
//! Persistent image of a database between WAL truncations.
//!
//! ## Responsibilities
//! - Persist the whole memtable to disk in sorted order
//! - Replace the previous image atomically (temp file + rename)
//! - Detect corruption on load
//!
//! ## File Format (V1)
//! ```text
//! ┌────────────────────────────────────────┐
//! │ Header                                 │
//! │ ┌──────────┬──────────┬──────────────┐ │
//! │ │Magic (4) │Version(2)│  CRC32 (4)   │ │
//! │ └──────────┴──────────┴──────────────┘ │
//! ├────────────────────────────────────────┤
//! │ Body: bincode(SnapshotBody)            │
//! │   last_lsn + sorted (key, value) pairs │
//! └────────────────────────────────────────┘
//! ```

mod snapshot;

pub use snapshot::Snapshot;
