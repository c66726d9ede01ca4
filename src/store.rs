//! Store Module
//!
//! The seam between database workers and the storage engine. A worker only
//! ever sees a `Box<dyn Store>` handed out by a [`StoreOpener`] while it is
//! mounting, and gives it back through [`Store::close`] when it unmounts.

use std::path::Path;

use crate::config::Config;
use crate::engine::{Engine, EngineOptions};
use crate::error::Result;

/// An open database handle, exclusively owned by one worker thread
pub trait Store: Send {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key, returning whether it existed
    fn delete(&mut self, key: &[u8]) -> Result<bool>;

    /// Entries with `start <= key <= end`, in key order
    fn range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Flush and release the handle
    fn close(self: Box<Self>) -> Result<()>;
}

/// Opens stores for named databases during mount
pub trait StoreOpener: Send + Sync {
    fn open(&self, name: &str, path: &Path) -> Result<Box<dyn Store>>;
}

impl Store for Engine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(Engine::get(self, key))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        Engine::put(self, key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool> {
        Engine::delete(self, key)
    }

    fn range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(Engine::range(self, start, end))
    }

    fn close(self: Box<Self>) -> Result<()> {
        Engine::close(*self)
    }
}

/// Opens an [`Engine`] per database
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOpener {
    options: EngineOptions,
}

impl EngineOpener {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(EngineOptions::from(config))
    }
}

impl StoreOpener for EngineOpener {
    fn open(&self, name: &str, path: &Path) -> Result<Box<dyn Store>> {
        tracing::debug!("Opening engine for {} at {}", name, path.display());
        let engine = Engine::open(path, self.options)?;
        Ok(Box::new(engine))
    }
}
