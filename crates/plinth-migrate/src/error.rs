use std::path::PathBuf;

use plinth_model::ModelError;
use thiserror::Error;

/// Error type returned by a migration step.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while discovering or applying migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A migration folder or file could not be read.
    #[error("failed to read {path}: {source}")]
    Discovery {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The ledger table could not be created, queried or written.
    #[error("migration ledger: {0}")]
    Ledger(#[from] ModelError),

    /// A discovered file is not SQL and no unit was registered for it.
    #[error("no migration registered for {file}")]
    UnknownMigration { file: String },

    /// A migration step failed; it was not recorded as executed.
    #[error("migration '{file}' failed: {source}")]
    Failed { file: String, source: BoxError },

    /// The blocking discovery task panicked or was cancelled.
    #[error("discovery task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
