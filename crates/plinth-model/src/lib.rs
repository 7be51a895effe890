//! Model layer for plinth.
//!
//! Types declare their table, columns and relations once in a static
//! [`Schema`]; instances wrap a [`Record`] that tracks field values against
//! a snapshot of what was last loaded or saved. `save()` turns the
//! difference into a single INSERT or UPDATE, and the relation descriptors
//! keep foreign keys and link tables consistent with what is held in
//! memory.
//!
//! All statements go through a [`Database`] passed in by the caller. There
//! is no transaction spanning more than one statement; many-to-many writes
//! compare affected row counts and report
//! [`ModelError::UnresolvedRaceCondition`] instead of guessing.

mod column;
mod error;
mod model;
mod record;
mod relation;
mod schema;
mod value;

pub use column::{Column, ColumnType};
pub use error::ModelError;
pub use model::{DynModel, Model};
pub use record::Record;
pub use relation::{LinkRoles, ManyToManyRelation, ManyToOneRelation, RelationState};
pub use schema::{RelationKey, Schema, SchemaBuilder};
pub use value::{Encode, FieldValue, JsonDecoder, JsonValue};

pub use plinth_db::{Database, Fields, Row, Value};
