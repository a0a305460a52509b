//! # IVP Difficulty Engine (ivp-difficulty)
//!
//! Session-scoped adaptive difficulty tracking for interview sessions.
//!
//! A session's difficulty is initialized from the user's choice, adjusted turn
//! by turn during the interview and finalized once at completion. Every change
//! is written through an in-memory cache to the `interview_sessions` row, both
//! as denormalized columns and as a replayable JSON state blob. A "practice
//! again" session is seeded with its predecessor's *ending* difficulty.
//!
//! Components:
//! - [`mapping`]: normalization between ordinals, tokens and labels
//! - [`state`]: the per-session state machine and its versioned blob format
//! - [`db`]: the durable session store
//! - [`cache`]: the write-through state cache
//! - [`manager`]: initialize / update / finalize / get / inherit
//! - [`validation`] and [`recovery`]: consistency checks and repair
//! - [`practice`]: creation of practice-again sessions
//! - [`stats`]: per-session difficulty statistics

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod manager;
pub mod mapping;
pub mod practice;
pub mod recovery;
pub mod state;
pub mod stats;
pub mod validation;

pub use error::{Error, Result};
pub use ivp_common::DifficultyLevel;
pub use manager::DifficultyStateManager;
pub use state::{DifficultyChange, SessionDifficultyState};
