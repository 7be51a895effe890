//! Error types for statement execution.

use thiserror::Error;

use crate::pool::PoolError;

/// Errors returned by [`Database`](crate::Database) operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// The pool could not be built.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// No connection could be checked out of the pool.
    #[error("failed to acquire a database connection: {0}")]
    Acquire(#[from] r2d2::Error),

    /// The statement itself failed.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The blocking task running the statement panicked or was cancelled.
    #[error("database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// [`Database::end`](crate::Database::end) was already called.
    #[error("database handle has been closed")]
    Closed,
}
