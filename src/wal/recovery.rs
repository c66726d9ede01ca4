//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{ElevatorError, Result};
use super::{WalEntry, HEADER_SIZE};

/// Upper bound on a single record's data; anything larger is a torn header
const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether bytes past the last valid entry were (or would be) cut off
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// Reads records until the first torn or corrupt one, then truncates the
    /// file to the end of the last valid record. Entries come back in LSN order.
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, result, valid_len) = Self::scan(path)?;

        if result.was_truncated {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
            tracing::warn!(
                "WAL {} truncated to {} bytes after LSN {}",
                path.display(),
                valid_len,
                result.last_lsn
            );
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (_, result, _) = Self::scan(path)?;
        Ok(result)
    }

    fn scan(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult, u64)> {
        let file = File::open(path)?;
        let total_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();
        let mut offset = 0u64;

        while offset < total_len {
            let mut header = [0u8; HEADER_SIZE];
            if total_len - offset < HEADER_SIZE as u64 {
                break;
            }
            reader.read_exact(&mut header)?;

            let (_, _, data_len) = WalEntry::parse_header(&header);
            let record_len = HEADER_SIZE as u64 + data_len as u64;
            if data_len > MAX_RECORD_SIZE || total_len - offset < record_len {
                break;
            }

            let mut data = vec![0u8; data_len as usize];
            reader.read_exact(&mut data)?;

            match WalEntry::deserialize(&header, &data) {
                Ok(entry) => {
                    result.last_lsn = entry.lsn;
                    result.entries_recovered += 1;
                    entries.push(entry);
                    offset += record_len;
                }
                Err(ElevatorError::WalCorruption(_)) | Err(ElevatorError::Serialization(_)) => {
                    result.entries_corrupted += 1;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        result.was_truncated = offset < total_len;
        Ok((entries, result, offset))
    }
}
