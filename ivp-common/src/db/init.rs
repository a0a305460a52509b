//! Database initialization
//!
//! Creates the database on first run and brings an existing one up to the
//! current schema. Every step is idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create tables, run migrations and create indexes on an open pool
///
/// Separate from [`init_database`] so in-memory pools can share the schema.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    create_schema_version_table(pool).await?;
    create_interview_sessions_table(pool).await?;

    // Migrations upgrade tables created by older releases
    crate::db::migrations::run_migrations(pool).await?;

    // Indexes reference migrated columns, so they come last
    create_interview_sessions_indexes(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the interview_sessions table
///
/// `difficulty_level` is the legacy single-difficulty column. The
/// `*_difficulty_level` / `difficulty_changes_count` columns mirror the state
/// blob in `difficulty_state_json` for reads that should not parse JSON.
pub async fn create_interview_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interview_sessions (
            guid TEXT PRIMARY KEY,
            user_guid TEXT,
            parent_session_guid TEXT REFERENCES interview_sessions(guid) ON DELETE SET NULL,
            difficulty_level TEXT NOT NULL DEFAULT 'medium',
            initial_difficulty_level TEXT,
            current_difficulty_level TEXT,
            final_difficulty_level TEXT,
            difficulty_changes_count INTEGER NOT NULL DEFAULT 0,
            difficulty_state_json TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_interview_sessions_indexes(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_interview_sessions_user ON interview_sessions(user_guid)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_interview_sessions_parent ON interview_sessions(parent_session_guid)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
