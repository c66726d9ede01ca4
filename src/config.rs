//! Configuration for Elevator
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for an Elevator server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all database files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── databases.store  (durable registry name list, unless store_path is set)
    ///     └── {name}/          (one directory per database)
    ///         ├── wal.log
    ///         └── snapshot.db
    pub data_dir: PathBuf,

    /// Location of the durable registry name list
    pub store_path: PathBuf,

    /// Database seeded on first start when no registry store exists
    pub default_db: String,

    // -------------------------------------------------------------------------
    // Engine Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// WAL size (in bytes) past which the engine folds it into a snapshot
    pub snapshot_threshold: u64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Listener poll timeout (milliseconds, 0 blocks indefinitely)
    pub poll_timeout_ms: u64,

    /// Connection read timeout (milliseconds, 0 disables)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 disables)
    pub write_timeout_ms: u64,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Config {
    const STORE_FILENAME: &'static str = "databases.store";

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Poll timeout as a Duration, `None` meaning "block until input"
    pub fn poll_timeout(&self) -> Option<Duration> {
        match self.poll_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("./elevator_data");
        Self {
            store_path: data_dir.join(Self::STORE_FILENAME),
            data_dir,
            default_db: "default".to_string(),
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            snapshot_threshold: 16 * 1024 * 1024, // 16 MB
            listen_addr: "127.0.0.1:4141".to_string(),
            max_connections: 1024,
            poll_timeout_ms: 100,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
    store_path_set: bool,
}

impl ConfigBuilder {
    /// Set the data directory (root for all databases)
    ///
    /// Unless `store_path` is set explicitly, the registry store follows it.
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the registry store location
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store_path = path.into();
        self.store_path_set = true;
        self
    }

    /// Set the name of the database seeded on first start
    pub fn default_db(mut self, name: impl Into<String>) -> Self {
        self.config.default_db = name.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the WAL size (in bytes) that triggers a snapshot
    pub fn snapshot_threshold(mut self, bytes: u64) -> Self {
        self.config.snapshot_threshold = bytes;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the listener poll timeout (in milliseconds)
    pub fn poll_timeout_ms(mut self, ms: u64) -> Self {
        self.config.poll_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(mut self) -> Config {
        if !self.store_path_set {
            self.config.store_path = self.config.data_dir.join(Config::STORE_FILENAME);
        }
        self.config
    }
}
