//! Executable migration units.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use plinth_db::Database;

use crate::error::BoxError;

type StepFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;
type StepFn = dyn Fn(Database) -> StepFuture + Send + Sync;

#[derive(Clone)]
enum Step {
    Sql(Vec<String>),
    Function(Arc<StepFn>),
}

impl Step {
    fn function<F, Fut>(f: F) -> Self
    where
        F: Fn(Database) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self::Function(Arc::new(move |db| Box::pin(f(db)) as StepFuture))
    }

    async fn run(&self, db: &Database) -> Result<(), BoxError> {
        match self {
            Self::Sql(statements) => {
                for statement in statements {
                    db.statement(statement.as_str(), Vec::new()).await?;
                }
                Ok(())
            }
            Self::Function(f) => f(db.clone()).await,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(statements) => f.debug_tuple("Sql").field(&statements.len()).finish(),
            Self::Function(_) => f.write_str("Function"),
        }
    }
}

/// One migration: an `up` step and an optional `down` step, each either a
/// batch of SQL statements or an async function.
///
/// ```rust,ignore
/// let seed = Migration::new(|db: Database| async move {
///     db.insert("INSERT INTO \"roles\" (\"name\") VALUES ('admin')", vec![]).await?;
///     Ok(())
/// });
/// ```
#[derive(Debug, Clone)]
pub struct Migration {
    up: Step,
    down: Option<Step>,
}

impl Migration {
    /// A batch of statements separated by `;`. Statements are trimmed;
    /// empty and comment-only ones are skipped.
    pub fn sql(text: &str) -> Self {
        Self {
            up: Step::Sql(split_statements(text)),
            down: None,
        }
    }

    pub fn new<F, Fut>(up: F) -> Self
    where
        F: Fn(Database) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            up: Step::function(up),
            down: None,
        }
    }

    pub fn with_down<F, Fut>(mut self, down: F) -> Self
    where
        F: Fn(Database) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.down = Some(Step::function(down));
        self
    }

    pub fn with_down_sql(mut self, text: &str) -> Self {
        self.down = Some(Step::Sql(split_statements(text)));
        self
    }

    pub fn has_down(&self) -> bool {
        self.down.is_some()
    }

    /// Applies the migration, statement by statement. A failure stops at the
    /// failing statement; earlier ones stay applied.
    ///
    /// # Errors
    ///
    /// Returns the first statement or function error.
    pub async fn up(&self, db: &Database) -> Result<(), BoxError> {
        self.up.run(db).await
    }

    /// Reverts the migration. Does nothing when no down step exists.
    ///
    /// # Errors
    ///
    /// Returns the first statement or function error.
    pub async fn down(&self, db: &Database) -> Result<(), BoxError> {
        match &self.down {
            Some(step) => step.run(db).await,
            None => {
                tracing::warn!("migration has no down step, nothing to revert");
                Ok(())
            }
        }
    }
}

fn split_statements(text: &str) -> Vec<String> {
    text.split(';')
        .map(str::trim)
        .filter(|statement| {
            statement
                .lines()
                .map(str::trim)
                .any(|line| !line.is_empty() && !line.starts_with("--"))
        })
        .map(String::from)
        .collect()
}
