//! The SQLite connection pool behind [`Database`](crate::Database).
//!
//! Every statement plinth issues checks one connection out of this pool and
//! returns it when the statement finishes, so `pool_max_size` bounds how
//! many statements run at once. A caller that finds the pool exhausted
//! waits up to `acquire_timeout_ms` and then fails with
//! [`DbError::Acquire`](crate::DbError::Acquire) instead of blocking
//! forever.
//!
//! Each new connection is switched to WAL, gets `foreign_keys = ON` so the
//! `ON DELETE` rules of link tables apply, and waits `busy_timeout_ms` on a
//! locked database. A `:memory:` path gives every connection its own private
//! database; use a file whenever more than one statement must see the same
//! data.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    pub pool_max_size: u32,

    /// How long a caller waits for a free connection before giving up, in
    /// milliseconds.
    pub acquire_timeout_ms: u64,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
            acquire_timeout_ms: 30_000,
        }
    }
}

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// A connection checked out of a [`DbPool`]. Returned to the pool on drop.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Errors that can occur when creating the database pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to build the connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Opens the pool for `db_path`. Connections are opened lazily up to
/// `settings.pool_max_size`, each prepared by [`prepare_connection`].
///
/// # Errors
///
/// Returns `PoolError::PoolInit` if the first connection cannot be opened
/// or prepared.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| prepare_connection(conn, settings.busy_timeout_ms));

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .connection_timeout(Duration::from_millis(settings.acquire_timeout_ms))
        .build(manager)?;

    Ok(pool)
}

fn prepare_connection(conn: &mut Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    // In-memory databases report "memory" instead of "wal".
    let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if journal_mode != "wal" && journal_mode != "memory" {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("journal mode stayed {journal_mode}, plinth needs wal")),
        ));
    }
    conn.execute_batch(&format!(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {busy_timeout_ms};"
    ))
}
