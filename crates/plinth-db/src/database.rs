//! Asynchronous statement execution on top of the connection pool.
//!
//! Every call checks a connection out of the pool on the tokio blocking
//! thread pool, runs exactly one statement, and hands the connection back
//! when the guard drops. There is no session affinity: two calls on the same
//! handle may run on different connections, and nothing here opens a
//! transaction spanning more than one statement.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::error::DbError;
use crate::pool::{create_pool, DbPool, DbRuntimeSettings, PooledConnection};
use crate::row::Row;

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// Rows matched by the statement.
    pub affected_rows: usize,
    /// Rows actually modified. SQLite does not distinguish matched from
    /// modified rows, so this always equals `affected_rows`.
    pub changed_rows: usize,
    /// Rowid generated by an `INSERT`.
    pub insert_id: Option<i64>,
}

struct Inner {
    pool: RwLock<Option<DbPool>>,
    queries: AtomicU64,
}

/// Shared handle to a pooled database.
///
/// Cloning is cheap; all clones use the same pool. Construct one at process
/// start, pass it to whatever needs storage, and call [`Database::end`] on
/// shutdown.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("open", &self.is_open())
            .field("queries", &self.query_count())
            .finish()
    }
}

impl Database {
    /// Opens a pool for the SQLite file at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Pool` if the pool cannot be created.
    pub fn connect(db_path: &str, settings: DbRuntimeSettings) -> Result<Self, DbError> {
        let pool = create_pool(db_path, settings)?;
        tracing::debug!(
            path = db_path,
            pool_max_size = settings.pool_max_size,
            "database pool created"
        );
        Ok(Self::from_pool(pool))
    }

    /// Wraps an already built pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool: RwLock::new(Some(pool)),
                queries: AtomicU64::new(0),
            }),
        }
    }

    /// Whether [`Database::end`] has not been called yet.
    pub fn is_open(&self) -> bool {
        self.inner
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Number of statements issued through this handle (and its clones).
    pub fn query_count(&self) -> u64 {
        self.inner.queries.load(Ordering::Relaxed)
    }

    fn pool(&self) -> Result<DbPool, DbError> {
        self.inner
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DbError::Closed)
    }

    /// Checks a connection out of the pool, waiting until one is free.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Acquire` when the acquire timeout elapses and
    /// `DbError::Closed` after [`Database::end`].
    pub async fn get_connection(&self) -> Result<PooledConnection, DbError> {
        let pool = self.pool()?;
        let conn = tokio::task::spawn_blocking(move || pool.get()).await??;
        Ok(conn)
    }

    async fn run<T, F>(&self, sql: String, f: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let pool = self.pool()?;
        self.inner.queries.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(sql = sql.as_str(), "executing statement");

        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn, &sql).map_err(DbError::from)
        })
        .await?
    }

    /// Runs a query and returns every row.
    ///
    /// # Errors
    ///
    /// Returns the underlying driver error if the statement fails.
    pub async fn select(
        &self,
        sql: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<Vec<Row>, DbError> {
        self.run(sql.into(), move |conn, sql| {
            let mut stmt = conn.prepare(sql)?;
            let names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            let mut rows = stmt.query(params_from_iter(values.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut result = Row::new();
                for (idx, name) in names.iter().enumerate() {
                    result.insert(name, row.get::<_, Value>(idx)?);
                }
                out.push(result);
            }
            Ok(out)
        })
        .await
    }

    /// Runs an `INSERT` and reports the generated rowid.
    ///
    /// # Errors
    ///
    /// Returns the underlying driver error if the statement fails.
    pub async fn insert(
        &self,
        sql: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<QueryResult, DbError> {
        self.run(sql.into(), move |conn, sql| {
            let affected = conn.execute(sql, params_from_iter(values.iter()))?;
            Ok(QueryResult {
                affected_rows: affected,
                changed_rows: affected,
                insert_id: Some(conn.last_insert_rowid()),
            })
        })
        .await
    }

    /// Runs an `UPDATE`.
    ///
    /// # Errors
    ///
    /// Returns the underlying driver error if the statement fails.
    pub async fn update(
        &self,
        sql: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<QueryResult, DbError> {
        self.execute(sql.into(), values).await
    }

    /// Runs a `DELETE`.
    ///
    /// # Errors
    ///
    /// Returns the underlying driver error if the statement fails.
    pub async fn delete(
        &self,
        sql: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<QueryResult, DbError> {
        self.execute(sql.into(), values).await
    }

    /// Runs any other single statement, such as DDL.
    ///
    /// # Errors
    ///
    /// Returns the underlying driver error if the statement fails.
    pub async fn statement(
        &self,
        sql: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<QueryResult, DbError> {
        self.execute(sql.into(), values).await
    }

    async fn execute(&self, sql: String, values: Vec<Value>) -> Result<QueryResult, DbError> {
        self.run(sql, move |conn, sql| {
            let affected = conn.execute(sql, params_from_iter(values.iter()))?;
            Ok(QueryResult {
                affected_rows: affected,
                changed_rows: affected,
                insert_id: None,
            })
        })
        .await
    }

    /// Closes the pool for graceful shutdown.
    ///
    /// Idle connections close immediately; connections still checked out
    /// close when their guard drops. Every later call on any clone of this
    /// handle fails with `DbError::Closed`.
    pub fn end(&self) {
        let pool = self
            .inner
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if pool.is_some() {
            tracing::debug!("database pool closed");
        }
    }
}
