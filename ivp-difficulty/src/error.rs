//! Error types for ivp-difficulty
//!
//! Usage errors (unknown or finalized sessions, redundant updates) are not
//! errors here: the manager reports them as `Ok(false)` / `Ok(None)` so that
//! difficulty tracking can never abort an interview.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for the difficulty engine
#[derive(Error, Debug)]
pub enum Error {
    /// Durable store round trip failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Error from shared infrastructure
    #[error(transparent)]
    Common(#[from] ivp_common::Error),

    /// State blob could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// State blob written by a newer release
    #[error("Unsupported state format version: {0}")]
    UnsupportedStateVersion(u32),

    /// Stored row or blob is structurally invalid
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// No session row with this id
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// Stored state exists but cannot be read; only recovery may replace it
    #[error("Session {0}: stored difficulty state unreadable, recovery required")]
    RecoveryRequired(Uuid),

    /// Engine configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
