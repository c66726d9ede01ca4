//! Write-Ahead Log (WAL) Module
//!
//! Every mutation of a mounted database is appended here before it touches
//! the memtable, so a crash between snapshots loses nothing that was
//! acknowledged.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2 ...                             │
//! └─────────────────────────────────────────┘
//! ```
//! `Data` is the bincode encoding of an [`Operation`]; the CRC covers the
//! LSN bytes and `Data`.

mod entry;
mod writer;
mod recovery;

pub use entry::{Operation, WalEntry, HEADER_SIZE};
pub use writer::WalWriter;
pub use recovery::{RecoveryResult, WalRecovery};
