//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries.

use serde::{Deserialize, Serialize};

use crate::error::{ElevatorError, Result};

/// LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl WalEntry {
    pub fn new(lsn: u64, operation: Operation) -> Self {
        Self { lsn, operation }
    }

    /// Serialize into the on-disk record layout
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(&self.operation)?;
        let crc = Self::checksum(self.lsn, &data);

        let mut record = Vec::with_capacity(HEADER_SIZE + data.len());
        record.extend_from_slice(&self.lsn.to_le_bytes());
        record.extend_from_slice(&crc.to_le_bytes());
        record.extend_from_slice(&(data.len() as u32).to_le_bytes());
        record.extend_from_slice(&data);
        Ok(record)
    }

    /// Rebuild an entry from a header and its data, verifying the CRC
    pub fn deserialize(header: &[u8; HEADER_SIZE], data: &[u8]) -> Result<Self> {
        let (lsn, crc, _) = Self::parse_header(header);
        if Self::checksum(lsn, data) != crc {
            return Err(ElevatorError::WalCorruption(format!(
                "CRC mismatch at LSN {}",
                lsn
            )));
        }
        let operation = bincode::deserialize(data)?;
        Ok(Self { lsn, operation })
    }

    /// Split a header into (lsn, crc, data_len)
    pub(crate) fn parse_header(header: &[u8; HEADER_SIZE]) -> (u64, u32, u32) {
        let mut lsn = [0u8; 8];
        lsn.copy_from_slice(&header[0..8]);
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&header[8..12]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&header[12..16]);
        (
            u64::from_le_bytes(lsn),
            u32::from_le_bytes(crc),
            u32::from_le_bytes(len),
        )
    }

    fn checksum(lsn: u64, data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&lsn.to_le_bytes());
        hasher.update(data);
        hasher.finalize()
    }
}
