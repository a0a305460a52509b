//! Difficulty engine diagnostics (ivp-difficulty) - Main entry point
//!
//! Operator tool for inspecting and repairing session difficulty state.
//! Reports are printed as JSON on stdout, logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use ivp_common::config::{database_path, resolve_root_folder, ROOT_FOLDER_ENV};
use ivp_common::db::init_database;
use ivp_difficulty::config::EngineConfig;
use ivp_difficulty::db::SqliteSessionStore;
use ivp_difficulty::practice::PracticeSessionService;
use ivp_difficulty::recovery::RecoveryService;
use ivp_difficulty::validation::{HealthScope, ValidationService};
use ivp_difficulty::DifficultyStateManager;

/// Command-line arguments for ivp-difficulty
#[derive(Parser, Debug)]
#[command(name = "ivp-difficulty")]
#[command(about = "Session difficulty diagnostics for IVP")]
#[command(version)]
struct Args {
    /// Root folder containing the IVP database
    #[arg(short, long, env = "IVP_ROOT_FOLDER")]
    root_folder: Option<String>,

    /// Config file (defaults to the platform config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or migrate the database
    InitDb,
    /// Print a session's difficulty state
    Show { session: Uuid },
    /// Print a session's difficulty statistics
    Stats { session: Uuid },
    /// Validate a session and show the recovery strategy that would apply
    Diagnose { session: Uuid },
    /// Validate all sessions, or one user's sessions
    Health {
        #[arg(long)]
        user: Option<Uuid>,
    },
    /// Repair a session's difficulty state
    Recover { session: Uuid },
    /// Discard a session's difficulty history and restart at its base level
    Reset { session: Uuid },
    /// Create a practice session from a completed one
    Practice { parent: Uuid },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode report")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ivp_difficulty=info,ivp_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, true)
        .context("Failed to resolve root folder")?;
    let db_path = database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let config = EngineConfig::load(args.config.as_deref())
        .context("Failed to load difficulty engine config")?;

    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let store = SqliteSessionStore::new(pool);
    let manager = Arc::new(DifficultyStateManager::from_config(Arc::new(store), config));

    match args.command {
        Command::InitDb => {
            info!("Database initialized at {}", db_path.display());
        }
        Command::Show { session } => {
            let state = manager
                .get(session)
                .await
                .context("Failed to read difficulty state")?
                .with_context(|| format!("No difficulty state for session {}", session))?;
            print_json(&state.to_record())?;
        }
        Command::Stats { session } => {
            let stats = manager
                .statistics(session)
                .await
                .context("Failed to read difficulty state")?
                .with_context(|| format!("No difficulty state for session {}", session))?;
            print_json(&stats)?;
        }
        Command::Diagnose { session } => {
            let diagnosis = RecoveryService::new(manager).diagnose(session).await;
            print_json(&diagnosis)?;
        }
        Command::Health { user } => {
            let scope = match user {
                Some(user) => HealthScope::User(user),
                None => HealthScope::System,
            };
            let report = ValidationService::new(manager).health_check(scope).await;
            print_json(&report)?;
        }
        Command::Recover { session } => {
            let outcome = RecoveryService::new(manager).recover(session).await;
            print_json(&outcome)?;
        }
        Command::Reset { session } => {
            let outcome = RecoveryService::new(manager).reset(session).await;
            print_json(&outcome)?;
        }
        Command::Practice { parent } => {
            let practice = PracticeSessionService::new(manager)
                .create_practice_session(parent)
                .await
                .context("Failed to create practice session")?;
            print_json(&practice)?;
        }
    }

    Ok(())
}
