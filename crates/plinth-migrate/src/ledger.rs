//! The `migrations` table: one row per executed migration file.

use std::sync::OnceLock;

use chrono::{NaiveDateTime, SubsecRound, Utc};
use plinth_db::{quote_ident, Database, Value};
use plinth_model::{Column, FieldValue, Model, ModelError, Record, Schema};

const TABLE: &str = "migrations";

const CREATE_TABLE: &str = r#"CREATE TABLE IF NOT EXISTS "migrations" (
    "id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "file" TEXT NOT NULL UNIQUE,
    "executedOn" TEXT NOT NULL
)"#;

/// A ledger entry.
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    record: Record,
}

impl MigrationRecord {
    pub fn id(&self) -> Option<i64> {
        self.record.get("id").and_then(FieldValue::as_i64)
    }

    pub fn file(&self) -> Option<&str> {
        self.record.get("file").and_then(FieldValue::as_str)
    }

    pub fn executed_on(&self) -> Option<NaiveDateTime> {
        self.record.get("executedOn").and_then(FieldValue::as_datetime)
    }
}

impl Model for MigrationRecord {
    fn schema() -> &'static Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            Schema::builder(TABLE)
                .column(Column::integer("id").primary())
                .column(Column::string("file"))
                .column(Column::datetime("executedOn"))
                .build()
        })
    }

    fn from_record(record: Record) -> Self {
        Self { record }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

/// Creates the ledger table if it does not exist yet.
pub(crate) async fn bootstrap(db: &Database) -> Result<(), ModelError> {
    db.statement(CREATE_TABLE, Vec::new()).await?;
    Ok(())
}

/// Whether `file` has been recorded as executed.
pub(crate) async fn is_executed(db: &Database, file: &str) -> Result<bool, ModelError> {
    let sql = format!(
        "SELECT {} FROM {table} AS {table} WHERE {table}.{} = ? LIMIT 1",
        MigrationRecord::default_select(TABLE),
        quote_ident("file"),
        table = quote_ident(TABLE),
    );
    let rows = db.select(sql, vec![Value::Text(file.to_string())]).await?;
    Ok(!MigrationRecord::from_rows(&rows, TABLE)?.is_empty())
}

/// Records `file` as executed now.
pub(crate) async fn record(db: &Database, file: &str) -> Result<MigrationRecord, ModelError> {
    let mut entry = MigrationRecord::new();
    entry.record_mut().set("file", file.to_string());
    entry
        .record_mut()
        .set("executedOn", Utc::now().naive_utc().trunc_subsecs(0));
    entry.save(db).await?;
    Ok(entry)
}

/// Every ledger entry in execution order.
pub(crate) async fn all(db: &Database) -> Result<Vec<MigrationRecord>, ModelError> {
    let sql = format!(
        "SELECT {} FROM {table} AS {table} ORDER BY {table}.{}",
        MigrationRecord::default_select(TABLE),
        quote_ident("id"),
        table = quote_ident(TABLE),
    );
    let rows = db.select(sql, Vec::new()).await?;
    MigrationRecord::from_rows(&rows, TABLE)
}
