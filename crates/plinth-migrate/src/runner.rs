use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use plinth_db::Database;

use crate::discovery::{discover, MigrationFile};
use crate::error::MigrationError;
use crate::ledger::{self, MigrationRecord};
use crate::migration::Migration;

/// Applies migrations found on disk, each exactly once.
///
/// `.sql` files are loaded as statement batches. Any other file is only a
/// marker for ordering: its unit must be registered under the file's
/// relative path with [`register`](Self::register).
#[derive(Debug, Clone)]
pub struct Migrator {
    db: Database,
    registered: HashMap<String, Migration>,
}

impl Migrator {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            registered: HashMap::new(),
        }
    }

    /// Registers the unit to run for `file`, e.g. `"members/migrations/004-backfill.rs"`.
    /// A registration also takes precedence over a `.sql` file of that name.
    pub fn register(mut self, file: impl Into<String>, migration: Migration) -> Self {
        self.registered.insert(file.into(), migration);
        self
    }

    /// Runs every migration under `root` that is not in the ledger yet, in
    /// order and one at a time, and returns the relative paths applied.
    ///
    /// The first failure stops the run. The failing file is not recorded,
    /// so the next run retries it; files applied before it stay recorded.
    ///
    /// # Errors
    ///
    /// Returns `Discovery` or `Ledger` before anything runs,
    /// `UnknownMigration` for a non-SQL file without a registered unit, or
    /// `Failed` for a migration that returned an error.
    pub async fn run_all(&self, root: impl AsRef<Path>) -> Result<Vec<String>, MigrationError> {
        ledger::bootstrap(&self.db).await?;

        let root: PathBuf = root.as_ref().to_path_buf();
        let files = tokio::task::spawn_blocking(move || discover(&root)).await??;
        tracing::debug!(count = files.len(), "discovered migrations");

        let mut applied = Vec::new();
        for file in &files {
            if ledger::is_executed(&self.db, &file.file).await? {
                tracing::debug!(migration = %file.file, "migration already applied, skipping");
                continue;
            }

            let migration = self.unit_for(file).await?;
            tracing::info!(migration = %file.file, "applying migration");
            if let Err(source) = migration.up(&self.db).await {
                tracing::error!(migration = %file.file, error = %source, "migration failed");
                return Err(MigrationError::Failed {
                    file: file.file.clone(),
                    source,
                });
            }

            ledger::record(&self.db, &file.file).await?;
            applied.push(file.file.clone());
        }

        tracing::info!(applied = applied.len(), "migrations complete");
        Ok(applied)
    }

    /// Whether `file` (a relative path) is recorded as executed.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Ledger` if the ledger cannot be queried.
    pub async fn is_executed(&self, file: &str) -> Result<bool, MigrationError> {
        ledger::bootstrap(&self.db).await?;
        Ok(ledger::is_executed(&self.db, file).await?)
    }

    /// The ledger, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Ledger` if the ledger cannot be queried.
    pub async fn executed(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        ledger::bootstrap(&self.db).await?;
        Ok(ledger::all(&self.db).await?)
    }

    async fn unit_for(&self, file: &MigrationFile) -> Result<Migration, MigrationError> {
        if let Some(migration) = self.registered.get(&file.file) {
            return Ok(migration.clone());
        }
        if !file.is_sql() {
            tracing::error!(migration = %file.file, "no migration registered for file");
            return Err(MigrationError::UnknownMigration {
                file: file.file.clone(),
            });
        }

        let up = read(file.path.clone()).await?;
        let mut migration = Migration::sql(&up);
        if let Some(down) = &file.down {
            migration = migration.with_down_sql(&read(down.clone()).await?);
        }
        Ok(migration)
    }
}

async fn read(path: PathBuf) -> Result<String, MigrationError> {
    tokio::task::spawn_blocking(move || {
        fs::read_to_string(&path).map_err(|source| MigrationError::Discovery { path, source })
    })
    .await?
}
