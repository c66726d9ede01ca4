//! Engine Module
//!
//! The storage engine behind one mounted database.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and the snapshot file
//! - Fold the WAL into a snapshot once it grows past the threshold
//! - Manage crash recovery on open

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Config, WalSyncStrategy};
use crate::error::Result;
use crate::memtable::MemTable;
use crate::storage::Snapshot;
use crate::wal::{Operation, WalRecovery, WalWriter};

/// Engine tuning, usually derived from [`Config`]
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub wal_sync_strategy: WalSyncStrategy,

    /// WAL size (in bytes) that triggers a snapshot
    pub snapshot_threshold: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            wal_sync_strategy: config.wal_sync_strategy,
            snapshot_threshold: config.snapshot_threshold,
        }
    }
}

/// The storage engine for a single database
///
/// ## Ownership Model
///
/// An engine is owned by exactly one worker thread while its database is
/// mounted, so writes take `&mut self` and nothing inside is locked.
/// Requests for the same database are serialized by the worker's mailbox
/// before they ever reach the engine.
pub struct Engine {
    options: EngineOptions,

    /// Directory holding this database's files
    data_dir: PathBuf,

    wal: WalWriter,

    memtable: MemTable,

    /// LSN contained in the current snapshot
    snapshot_lsn: u64,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SNAPSHOT_FILENAME: &'static str = "snapshot.db";

    /// Open or create an engine in `path`
    ///
    /// On open:
    /// 1. Create the directory if needed
    /// 2. Load the snapshot, if any
    /// 3. Replay WAL entries newer than the snapshot
    /// 4. Fold the replayed entries into a fresh snapshot
    pub fn open(path: &Path, options: EngineOptions) -> Result<Self> {
        fs::create_dir_all(path)?;

        let wal_path = path.join(Self::WAL_FILENAME);
        let snapshot_path = path.join(Self::SNAPSHOT_FILENAME);

        let (mut memtable, snapshot_lsn) = match Snapshot::load(&snapshot_path)? {
            Some(snapshot) => (snapshot.table, snapshot.last_lsn),
            None => (MemTable::new(), 0),
        };

        let mut last_lsn = snapshot_lsn;
        let mut replayed = 0u64;
        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;
            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    "WAL recovery in {}: {} entries recovered, {} corrupted, last_lsn={}",
                    path.display(),
                    recovery.entries_recovered,
                    recovery.entries_corrupted,
                    recovery.last_lsn
                );
            }

            for entry in entries {
                // Entries at or below the snapshot LSN are already in the table
                if entry.lsn <= snapshot_lsn {
                    continue;
                }
                match entry.operation {
                    Operation::Put { key, value } => {
                        memtable.put(key, value);
                    }
                    Operation::Delete { key } => {
                        memtable.delete(&key);
                    }
                }
                last_lsn = last_lsn.max(entry.lsn);
                replayed += 1;
            }
        }

        let wal = WalWriter::open_after(&wal_path, options.wal_sync_strategy, last_lsn)?;

        let mut engine = Self {
            options,
            data_dir: path.to_path_buf(),
            wal,
            memtable,
            snapshot_lsn,
        };

        // Make replayed data durable in the snapshot before new writes land
        if replayed > 0 {
            engine.snapshot()?;
        }

        Ok(engine)
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.memtable.get(key).map(|v| v.to_vec())
    }

    /// Put a key-value pair (WAL first, then memtable)
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.wal.append(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })?;
        self.memtable.put(key.to_vec(), value.to_vec());
        self.maybe_snapshot()
    }

    /// Delete a key, returning whether it existed
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        if self.memtable.get(key).is_none() {
            return Ok(false);
        }
        self.wal.append(Operation::Delete { key: key.to_vec() })?;
        self.memtable.delete(key);
        self.maybe_snapshot()?;
        Ok(true)
    }

    /// Entries with `start <= key <= end`
    pub fn range(&self, start: &[u8], end: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.memtable.range(start, end)
    }

    /// Write the memtable to a snapshot and truncate the WAL
    pub fn snapshot(&mut self) -> Result<()> {
        let lsn = self.wal.current_lsn() - 1;
        Snapshot::write(&self.data_dir.join(Self::SNAPSHOT_FILENAME), lsn, &self.memtable)?;
        self.wal.truncate()?;
        self.snapshot_lsn = lsn;
        tracing::debug!("Snapshot of {} written at LSN {}", self.data_dir.display(), lsn);
        Ok(())
    }

    fn maybe_snapshot(&mut self) -> Result<()> {
        if self.wal.size() >= self.options.snapshot_threshold {
            self.snapshot()?;
        }
        Ok(())
    }

    /// Close the engine gracefully
    ///
    /// Snapshots pending WAL entries and syncs to disk
    pub fn close(mut self) -> Result<()> {
        if self.wal.current_lsn() - 1 > self.snapshot_lsn {
            self.snapshot()?;
        }
        self.wal.sync()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn len(&self) -> usize {
        self.memtable.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.memtable.is_empty()
    }

    /// Current WAL size in bytes
    pub fn wal_size(&self) -> u64 {
        self.wal.size()
    }

    /// LSN contained in the latest snapshot
    pub fn snapshot_lsn(&self) -> u64 {
        self.snapshot_lsn
    }
}
