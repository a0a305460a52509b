//! Database schema migrations
//!
//! Versioned, idempotent migrations tracked in the `schema_version` table.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field depend on them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Check before altering** - every migration must be safe to run twice
//! 4. **Use ALTER TABLE** - prefer ALTER TABLE over DROP/CREATE to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Columns added to `interview_sessions` by migration v1
const DIFFICULTY_COLUMNS: &[(&str, &str)] = &[
    (
        "parent_session_guid",
        "TEXT REFERENCES interview_sessions(guid) ON DELETE SET NULL",
    ),
    ("initial_difficulty_level", "TEXT"),
    ("current_difficulty_level", "TEXT"),
    ("final_difficulty_level", "TEXT"),
    ("difficulty_changes_count", "INTEGER NOT NULL DEFAULT 0"),
    ("difficulty_state_json", "TEXT"),
];

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}

/// Migration v1: Add difficulty tracking columns to interview_sessions
///
/// Sessions created before difficulty tracking only carry `difficulty_level`.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: Add difficulty tracking columns to interview_sessions");

    for (column, definition) in DIFFICULTY_COLUMNS {
        if column_exists(pool, "interview_sessions", column).await? {
            continue;
        }

        let sql = format!(
            "ALTER TABLE interview_sessions ADD COLUMN {} {}",
            column, definition
        );
        sqlx::query(&sql).execute(pool).await?;
        info!("Migration v1: Added {} to interview_sessions", column);
    }

    Ok(())
}

/// Migration v2: Backfill initial/current difficulty from the legacy column
///
/// Leaves `difficulty_state_json` NULL; those rows are read through the
/// column fallbacks until a state is written for them.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: Backfill difficulty columns from difficulty_level");

    let result = sqlx::query(
        r#"
        UPDATE interview_sessions
        SET initial_difficulty_level = COALESCE(initial_difficulty_level, LOWER(difficulty_level)),
            current_difficulty_level = COALESCE(current_difficulty_level, LOWER(difficulty_level))
        WHERE initial_difficulty_level IS NULL OR current_difficulty_level IS NULL
        "#,
    )
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        info!(
            "Migration v2: Backfilled difficulty columns for {} sessions",
            result.rows_affected()
        );
    }

    Ok(())
}
