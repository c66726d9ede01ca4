//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::config::WalSyncStrategy;
use crate::error::Result;
use super::{Operation, WalEntry};

/// Writes entries to the WAL file
pub struct WalWriter {
    writer: BufWriter<File>,

    /// LSN the next append will receive
    next_lsn: u64,

    sync_strategy: WalSyncStrategy,

    /// Entries appended since the last fsync
    unsynced: usize,

    /// Current file length in bytes
    size: u64,
}

impl WalWriter {
    /// Open or create a WAL file, appending after any existing records
    ///
    /// LSNs restart at 1; callers that replayed the log first should use
    /// `open_after`.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        Self::open_after(path, sync_strategy, 0)
    }

    /// Open a WAL whose last durable LSN is `last_lsn`
    pub fn open_after(path: &Path, sync_strategy: WalSyncStrategy, last_lsn: u64) -> Result<Self> {
        let mut file = OpenOptions::new().create(true).read(true).write(true).open(path)?;
        let size = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            writer: BufWriter::new(file),
            next_lsn: last_lsn + 1,
            sync_strategy,
            unsynced: 0,
            size,
        })
    }

    /// Append an operation, returning its LSN
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        let lsn = self.next_lsn;
        let record = WalEntry::new(lsn, operation).serialize()?;

        self.writer.write_all(&record)?;
        self.size += record.len() as u64;
        self.next_lsn += 1;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if due {
            self.sync()?;
        } else {
            self.writer.flush()?;
        }

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop every record (their effects are durable elsewhere)
    ///
    /// LSNs keep counting up across truncation.
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        self.size = 0;
        self.unsynced = 0;
        Ok(())
    }

    /// LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Current size of the log in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
}
