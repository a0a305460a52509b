//! # IVP Common Library
//!
//! Shared code for the interview practice services including:
//! - Database bootstrap, migrations and row models
//! - The canonical difficulty level type
//! - Configuration and root folder resolution
//! - Timestamp source

pub mod config;
pub mod db;
pub mod difficulty;
pub mod error;
pub mod time;

pub use difficulty::DifficultyLevel;
pub use error::{Error, Result};
