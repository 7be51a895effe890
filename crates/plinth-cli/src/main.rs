//! `plinth-migrate`: applies pending migrations and exits.
//!
//! Loads configuration, opens the database pool, runs every migration found
//! under the configured root that is not yet in the ledger, and closes the
//! pool. Exits with status 1 on the first failure.

mod config;

use std::process::ExitCode;

use plinth_db::Database;
use plinth_migrate::Migrator;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "plinth.toml";

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("PLINTH_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn init_tracing(logging: &config::LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path
        .as_deref()
        .unwrap_or(DEFAULT_CONFIG_PATH);

    let config = match config::load_config(Some(selected_config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration from {selected_config_path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.logging);

    tracing::info!(
        source = config_source,
        path = selected_config_path,
        "resolved startup configuration path"
    );

    let db = match Database::connect(&config.database.path, config.database.runtime_settings()) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(
                path = %config.database.path,
                error = %e,
                "failed to open database, check database.path in config"
            );
            return ExitCode::FAILURE;
        }
    };

    let migrator = Migrator::new(db.clone());
    let outcome = migrator.run_all(&config.migrations.root).await;
    db.end();

    match outcome {
        Ok(applied) => {
            tracing::info!(
                count = applied.len(),
                root = %config.migrations.root,
                "applied database migrations"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "migration run failed");
            ExitCode::FAILURE
        }
    }
}
