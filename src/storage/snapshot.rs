//! Snapshot file
//!
//! Whole-table image written when the WAL grows too large and on close.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ElevatorError, Result};
use crate::memtable::MemTable;

/// Magic bytes identifying an Elevator snapshot file
const MAGIC: &[u8; 4] = b"ELVS";

/// Current snapshot format version
const VERSION: u16 = 1;

/// Magic (4) + Version (2) + CRC (4)
const HEADER_SIZE: usize = 10;

#[derive(Serialize, Deserialize)]
struct SnapshotBody {
    last_lsn: u64,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

/// A loaded snapshot
#[derive(Debug)]
pub struct Snapshot {
    /// Last WAL LSN whose effect is contained in the snapshot
    pub last_lsn: u64,

    pub table: MemTable,
}

impl Snapshot {
    /// Load the snapshot at `path`, or `None` if there is none yet
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        if bytes.len() < HEADER_SIZE || &bytes[0..4] != MAGIC {
            return Err(ElevatorError::Storage(format!(
                "{} is not a snapshot file",
                path.display()
            )));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(ElevatorError::Storage(format!(
                "Unsupported snapshot version {} in {}",
                version,
                path.display()
            )));
        }

        let crc = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let body = &bytes[HEADER_SIZE..];
        if crc32fast::hash(body) != crc {
            return Err(ElevatorError::Storage(format!(
                "Snapshot checksum mismatch in {}",
                path.display()
            )));
        }

        let body: SnapshotBody = bincode::deserialize(body)?;
        Ok(Some(Self {
            last_lsn: body.last_lsn,
            table: MemTable::from_entries(body.entries),
        }))
    }

    /// Write `table` as the new snapshot at `path`
    ///
    /// The previous snapshot stays intact until the rename succeeds.
    pub fn write(path: &Path, last_lsn: u64, table: &MemTable) -> Result<()> {
        let body = SnapshotBody {
            last_lsn,
            entries: table.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        let body = bincode::serialize(&body)?;

        let tmp_path = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            writer.write_all(MAGIC)?;
            writer.write_all(&VERSION.to_le_bytes())?;
            writer.write_all(&crc32fast::hash(&body).to_le_bytes())?;
            writer.write_all(&body)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        Ok(())
    }
}
