use rusqlite::Error as RusqliteError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlBootError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error), // Converts io::Error into SqlBootError automatically

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError), // Converts rusqlite::Error automatically

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Bootstrap lock busy: {0}")]
    LockBusy(String),

    #[error("Migration '{name}' failed: {source}")]
    MigrationError {
        name: String,
        #[source]
        source: RusqliteError,
    },

    #[error("Seed '{name}' failed: {source}")]
    SeedError {
        name: String,
        #[source]
        source: RusqliteError,
    },

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}
