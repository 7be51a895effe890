//! Error types for the persistence layer.

use plinth_db::DbError;
use thiserror::Error;

/// Errors that can occur while loading, saving or relating models.
#[derive(Debug, Error)]
pub enum ModelError {
    /// An insert was attempted while a required column had no value.
    #[error("tried to create {model} with undefined column {column}")]
    MissingColumn { model: &'static str, column: &'static str },

    /// A loaded relation and its foreign key disagree, or the relation
    /// points at an instance that is not saved.
    #[error("relation {relation} on {model}: {reason}")]
    RelationInvariantViolation {
        model: &'static str,
        relation: &'static str,
        reason: String,
    },

    /// A relation setter or link was given an instance that is not saved.
    #[error("relation {relation} cannot reference a model that is not saved yet")]
    UnsavedRelationTarget { relation: &'static str },

    /// The operation needs an instance that exists in the database.
    #[error("{model} does not exist in the database")]
    NotPersisted { model: &'static str },

    /// A value does not fit the declared column type.
    #[error("type mismatch for column {column}: {reason}")]
    TypeMismatch { column: &'static str, reason: String },

    /// A many-to-many write touched a different number of link rows than
    /// requested, so the in-memory relation can no longer be trusted.
    #[error(
        "unresolved race condition on {relation}: expected {expected} link rows, {affected} affected"
    )]
    UnresolvedRaceCondition {
        relation: &'static str,
        expected: usize,
        affected: usize,
    },

    /// An integer primary key was assigned by hand before the first insert.
    #[error("primary key of {model} was set without loading it from the database; integer primary keys are assigned on insert")]
    PrimaryKeyAssigned { model: &'static str },

    /// The instance came from the database but its primary key was not selected.
    #[error("{model} was loaded from the database without its primary key")]
    MissingPrimaryKey { model: &'static str },

    /// The primary key of a persisted instance differs from the stored one.
    #[error("primary key of {model} cannot change once it exists in the database")]
    PrimaryKeyChanged { model: &'static str },

    /// The instance was deleted; deleted instances cannot be saved again.
    #[error("{model} was deleted and cannot be saved again")]
    Deleted { model: &'static str },

    /// A column name that the model does not declare.
    #[error("unknown column {column} on {model}")]
    UnknownColumn { model: &'static str, column: String },

    /// Every column was excluded from a select list.
    #[error("no columns left to select from {model}")]
    EmptySelection { model: &'static str },

    /// The static column/relation registration is inconsistent.
    #[error("invalid schema for table {table}: {reason}")]
    InvalidSchema { table: &'static str, reason: String },

    /// The statement failed in the database.
    #[error(transparent)]
    Database(#[from] DbError),
}
