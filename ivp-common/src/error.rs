//! Shared error type for the IVP crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the shared infrastructure: database bootstrap, config
/// files and difficulty parsing
#[derive(Error, Debug)]
pub enum Error {
    /// Schema creation, migration or query failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database directory or config file could not be read or created
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Text that names no difficulty level
    #[error("Unknown difficulty level: {0:?}")]
    InvalidDifficulty(String),
}
