//! Folder-based migrations for plinth.
//!
//! Migrations live in `<root>/<feature>/migrations/`. They are ordered by
//! file name alone, so `a/migrations/001-y.sql` runs before
//! `b/migrations/002-x.sql` whatever the folder order. Executed files are
//! recorded by relative path in the `migrations` ledger table and never run
//! again.
//!
//! Runs are strictly sequential. There is no rollback of a batch: a failure
//! stops the run and leaves earlier migrations applied and recorded.

mod discovery;
mod error;
mod ledger;
mod migration;
mod runner;

pub use discovery::{discover, MigrationFile};
pub use error::{BoxError, MigrationError};
pub use ledger::MigrationRecord;
pub use migration::Migration;
pub use runner::Migrator;
