//! Pooled, asynchronous SQLite access for plinth.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and a [`Database`] handle that runs single statements on the tokio
//! blocking pool and returns namespaced [`Row`]s or a [`QueryResult`].
//!
//! # Design decisions
//!
//! - **Explicit handle**: a [`Database`] is constructed once and passed to
//!   whatever needs it. Tests build isolated pools side by side.
//! - **One statement, one checkout**: a connection is held only for the
//!   duration of a single statement and is released on every exit path.
//!   This layer coordinates no transactions.
//! - **Namespaced rows**: result columns aliased as `"ns.column"` are
//!   grouped per namespace so joined tables can be hydrated separately.

mod database;
mod error;
mod pool;
mod row;

pub use database::{Database, QueryResult};
pub use error::DbError;
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError, PooledConnection};
pub use row::{Fields, Row, UNNAMESPACED};

/// Storage value type exchanged with the driver.
pub use rusqlite::types::Value;

/// Quotes an SQL identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Builds a `?, ?, ?` placeholder list.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
