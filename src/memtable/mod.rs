//! MemTable Module
//!
//! In-memory image of one mounted database.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Track size for diagnostics
//! - Ordered iteration for range scans and snapshots
//!
//! ## Data Structure Choice
//! A plain BTreeMap: the owning worker thread is the only writer and the
//! only reader, so no interior locking is needed. Deletes remove the key
//! outright because the snapshot always holds the whole table.

mod table;

pub use table::MemTable;
