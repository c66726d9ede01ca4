//! Error types for Elevator
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using ElevatorError
pub type Result<T> = std::result::Result<T, ElevatorError>;

/// Unified error type for Elevator operations
#[derive(Debug, Error)]
pub enum ElevatorError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Registry Errors
    // -------------------------------------------------------------------------
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Database already exists: {0}")]
    DatabaseExists(String),

    #[error("Invalid database name: {0}")]
    InvalidDatabaseName(String),

    #[error("Registry store not found at {}", .0.display())]
    StoreNotFound(PathBuf),

    #[error("Registry persistence failed: {0}")]
    Persistence(String),

    // -------------------------------------------------------------------------
    // Worker Errors
    // -------------------------------------------------------------------------
    #[error("Failed to mount database {name}: {reason}")]
    Mount { name: String, reason: String },

    #[error("Database temporarily unavailable: {0}")]
    Unavailable(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Worker thread failed: {0}")]
    WorkerPanicked(String),
}

impl From<bincode::Error> for ElevatorError {
    fn from(err: bincode::Error) -> Self {
        ElevatorError::Serialization(err.to_string())
    }
}
