//! Database Registry
//!
//! Process-wide table of named databases, each backed by a [`DbWorker`].
//!
//! # Lifecycle
//!
//! - Constructed at startup, then `load()`ed from the durable name list
//!   (or seeded with `add(default)` when there is none)
//! - Mutated only through `add`/`remove`/`drop_database`
//! - `shutdown()` drains and unmounts every worker before the process exits
//!
//! # Concurrency
//!
//! - `workers` is an `RwLock`: lookups take the read side briefly and never
//!   wait on worker execution
//! - `mutation` serializes every mutation so the persisted name list and the
//!   in-memory table always change together
//! - A worker becomes visible to lookups only after the name list holding
//!   it has been persisted, and stops being visible before it is drained

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::commands::CommandRegistry;
use crate::config::Config;
use crate::error::{ElevatorError, Result};
use crate::store::StoreOpener;
use crate::worker::{DbWorker, MountState};

/// On-disk layout of the registry store
#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u16,
    names: Vec<String>,
}

const STORE_VERSION: u16 = 1;

/// Database information for DBLIST-style reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
    pub state: MountState,
    pub pending: usize,
    pub processed: u64,
}

/// Registry of named databases
pub struct DbRegistry {
    workers: RwLock<HashMap<String, Arc<DbWorker>>>,

    /// Serializes add/remove/drop against each other
    mutation: Mutex<()>,

    /// Durable list of database names
    store_path: PathBuf,

    /// Root under which each database gets its own directory
    data_dir: PathBuf,

    opener: Arc<dyn StoreOpener>,
    commands: Arc<CommandRegistry>,
}

impl DbRegistry {
    /// Create an empty registry
    pub fn new(config: &Config, opener: Arc<dyn StoreOpener>, commands: Arc<CommandRegistry>) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            mutation: Mutex::new(()),
            store_path: config.store_path.clone(),
            data_dir: config.data_dir.clone(),
            opener,
            commands,
        }
    }

    /// Validate database name
    ///
    /// Allowed characters: [a-zA-Z0-9_-]
    /// Length: 1-128 characters
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > 128 {
            return Err(ElevatorError::InvalidDatabaseName(
                "Name must be 1-128 characters".to_string(),
            ));
        }

        let valid = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if !valid {
            return Err(ElevatorError::InvalidDatabaseName(format!(
                "{:?}: only a-z, A-Z, 0-9, _, - are allowed",
                name
            )));
        }

        Ok(())
    }

    /// Rebuild the table from the durable name list; every worker starts unmounted
    ///
    /// Returns the number of databases loaded, or `StoreNotFound` when no
    /// list has ever been written (the caller seeds a default database).
    pub fn load(&self) -> Result<usize> {
        let _guard = self.mutation.lock();

        let names = read_store(&self.store_path)?;
        let mut loaded = HashMap::with_capacity(names.len());
        for name in names {
            Self::validate_name(&name)?;
            let worker = self.new_worker(&name);
            loaded.insert(name, worker);
        }

        let count = loaded.len();
        *self.workers.write() = loaded;
        tracing::info!("Loaded {} databases from {}", count, self.store_path.display());
        Ok(count)
    }

    /// Create a new unmounted database
    ///
    /// The name list is persisted before the worker becomes reachable; if
    /// persisting fails nothing changes.
    pub fn add(&self, name: &str) -> Result<Arc<DbWorker>> {
        Self::validate_name(name)?;
        let _guard = self.mutation.lock();

        if self.workers.read().contains_key(name) {
            return Err(ElevatorError::DatabaseExists(name.to_string()));
        }

        let mut names = self.names();
        names.push(name.to_string());
        write_store(&self.store_path, names)?;

        let worker = self.new_worker(name);
        self.workers.write().insert(name.to_string(), Arc::clone(&worker));

        tracing::info!("Database {} added", name);
        Ok(worker)
    }

    /// Remove a database
    ///
    /// The name list is persisted first, then the worker is unpublished,
    /// then it drains every job already queued and closes its store. Jobs
    /// that reach the retired worker afterwards fail as `DatabaseNotFound`.
    /// Files on disk are left alone; see `drop_database`.
    pub fn remove(&self, name: &str) -> Result<()> {
        let _guard = self.mutation.lock();
        self.remove_locked(name)?;
        tracing::info!("Database {} removed", name);
        Ok(())
    }

    /// Remove a database and delete its files
    ///
    /// Runs as one mutation, so no `add` of the same name can slip in
    /// between the removal and the deletion and reopen the old files.
    pub fn drop_database(&self, name: &str) -> Result<()> {
        let _guard = self.mutation.lock();
        self.remove_locked(name)?;

        let path = self.database_dir(name);
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        tracing::info!("Database {} dropped", name);
        Ok(())
    }

    /// Caller holds `mutation`
    ///
    /// Once the new name list is persisted the removal stands; a worker
    /// that fails to drain cleanly is logged, not reported.
    fn remove_locked(&self, name: &str) -> Result<()> {
        let worker = self
            .lookup(name)
            .ok_or_else(|| ElevatorError::DatabaseNotFound(name.to_string()))?;

        let names: Vec<String> = self.names().into_iter().filter(|n| n != name).collect();
        write_store(&self.store_path, names)?;

        self.workers.write().remove(name);
        if let Err(e) = worker.retire() {
            tracing::error!("Database {} did not drain cleanly: {}", name, e);
        }
        Ok(())
    }

    /// Find a database by name
    pub fn lookup(&self, name: &str) -> Option<Arc<DbWorker>> {
        self.workers.read().get(name).cloned()
    }

    /// Find a database by name, failing with `DatabaseNotFound`
    pub fn lookup_required(&self, name: &str) -> Result<Arc<DbWorker>> {
        self.lookup(name)
            .ok_or_else(|| ElevatorError::DatabaseNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workers.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Per-database status, sorted by name
    pub fn list(&self) -> Vec<DatabaseInfo> {
        let mut infos: Vec<DatabaseInfo> = self
            .workers
            .read()
            .values()
            .map(|w| DatabaseInfo {
                name: w.name().to_string(),
                state: w.state(),
                pending: w.pending(),
                processed: w.processed(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }

    /// Directory holding the files of database `name`
    pub fn database_dir(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Drain and unmount every worker
    ///
    /// Each worker finishes the jobs already in its mailbox before its
    /// store closes. Keeps going past failures and reports the first one.
    pub fn shutdown(&self) -> Result<()> {
        let workers: Vec<Arc<DbWorker>> = self.workers.read().values().cloned().collect();
        let mut first_error = None;

        for worker in workers {
            if let Err(e) = worker.unmount() {
                tracing::error!("Failed to unmount {}: {}", worker.name(), e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn new_worker(&self, name: &str) -> Arc<DbWorker> {
        Arc::new(DbWorker::new(
            name,
            self.database_dir(name),
            Arc::clone(&self.opener),
            Arc::clone(&self.commands),
        ))
    }
}

impl std::fmt::Debug for DbRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbRegistry")
            .field("store_path", &self.store_path)
            .field("databases", &self.names())
            .finish()
    }
}

// =============================================================================
// Durable name list
// =============================================================================

fn read_store(path: &Path) -> Result<Vec<String>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ElevatorError::StoreNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let store: StoreFile = bincode::deserialize(&bytes)?;
    if store.version != STORE_VERSION {
        return Err(ElevatorError::Serialization(format!(
            "Unsupported registry store version {} in {}",
            store.version,
            path.display()
        )));
    }
    Ok(store.names)
}

/// Replace the name list atomically (temp file, fsync, rename)
fn write_store(path: &Path, mut names: Vec<String>) -> Result<()> {
    names.sort();
    names.dedup();

    let persist = || -> std::result::Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let bytes = bincode::serialize(&StoreFile {
            version: STORE_VERSION,
            names,
        })?;

        let tmp_path = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            writer.write_all(&bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    };

    persist().map_err(|e| ElevatorError::Persistence(format!("{}: {}", path.display(), e)))
}
