//! Per-instance persistence state and the save/delete engine.
//!
//! A [`Record`] holds the field values of one model instance, a snapshot of
//! their storage form as of the last load or save, the relation slots, and
//! the existence flag. Typed models wrap a `Record` and expose accessors;
//! everything that iterates "all columns" happens here, driven by the
//! type's [`Schema`].
//!
//! Lifecycle: transient → persisted (first `save`, an INSERT) → persisted
//! (later `save`s, an UPDATE or nothing) → deleted. Deleted is terminal.

use std::collections::HashMap;
use std::fmt;

use chrono::{SubsecRound, Utc};
use plinth_db::{placeholders, quote_ident, Database, Fields, Value};

use crate::error::ModelError;
use crate::model::DynModel;
use crate::schema::Schema;
use crate::value::FieldValue;

/// Contents of a loaded relation. An absent slot means "not loaded".
pub(crate) enum RelationSlot {
    /// Many-to-one: `None` is loaded-and-cleared, `Some` loaded-and-set.
    One(Option<Box<dyn DynModel>>),
    /// Many-to-many: the loaded targets, in order.
    Many(Vec<Box<dyn DynModel>>),
}

impl Clone for RelationSlot {
    fn clone(&self) -> Self {
        match self {
            Self::One(target) => Self::One(target.as_ref().map(|t| t.clone_box())),
            Self::Many(targets) => Self::Many(targets.iter().map(|t| t.clone_box()).collect()),
        }
    }
}

impl fmt::Debug for RelationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(target) => f.debug_tuple("One").field(target).finish(),
            Self::Many(targets) => f.debug_tuple("Many").field(targets).finish(),
        }
    }
}

/// Field values, snapshot and relation state of one model instance.
#[derive(Clone)]
pub struct Record {
    schema: &'static Schema,
    exists: bool,
    deleted: bool,
    fields: HashMap<&'static str, FieldValue>,
    saved: HashMap<&'static str, Value>,
    relations: HashMap<&'static str, RelationSlot>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.schema.table())
            .field("exists", &self.exists)
            .field("deleted", &self.deleted)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .finish()
    }
}

impl Record {
    /// A transient record with every column undefined.
    pub fn new(schema: &'static Schema) -> Self {
        Self {
            schema,
            exists: false,
            deleted: false,
            fields: HashMap::new(),
            saved: HashMap::new(),
            relations: HashMap::new(),
        }
    }

    /// Builds a persisted record from the columns of one row namespace.
    ///
    /// Returns `None` when the primary key is absent or `NULL`, which is how
    /// an unmatched `LEFT JOIN` shows up. Columns missing from `fields` stay
    /// undefined.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::TypeMismatch` if a stored value does not fit its
    /// column.
    pub fn from_fields(schema: &'static Schema, fields: &Fields) -> Result<Option<Self>, ModelError> {
        match fields.get(schema.primary().name()) {
            None | Some(Value::Null) => return Ok(None),
            Some(_) => {}
        }

        let mut record = Self::new(schema);
        for column in schema.columns() {
            if let Some(value) = fields.get(column.name()) {
                record
                    .fields
                    .insert(column.name(), column.from_storage(value.clone())?);
            }
        }
        record.mark_saved()?;
        Ok(Some(record))
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn exists_in_database(&self) -> bool {
        self.exists
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// The value of a column, or `None` while it is undefined.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Sets a column value. Names that are not registered columns are kept
    /// in memory but never written.
    pub fn set(&mut self, name: &'static str, value: impl Into<FieldValue>) {
        self.fields.insert(name, value.into());
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Forgets a column's value and its snapshot, making it undefined.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnknownColumn` if the column is not registered.
    pub fn erase(&mut self, name: &str) -> Result<(), ModelError> {
        let column = self
            .schema
            .column(name)
            .ok_or_else(|| ModelError::UnknownColumn {
                model: self.schema.table(),
                column: name.to_string(),
            })?;
        self.fields.remove(column.name());
        self.saved.remove(column.name());
        Ok(())
    }

    /// The primary key, or `None` while it is undefined or `NULL`.
    pub fn primary_key(&self) -> Option<FieldValue> {
        self.fields
            .get(self.schema.primary().name())
            .filter(|value| !value.is_null())
            .cloned()
    }

    /// The storage form of the primary key. A persisted record answers with
    /// the key it was loaded or saved under, whatever the field now holds.
    pub(crate) fn primary_storage(&self) -> Result<Value, ModelError> {
        let primary = self.schema.primary();
        if self.exists {
            if let Some(stored) = self.saved.get(primary.name()) {
                return Ok(stored.clone());
            }
        }
        let id = self.primary_key().ok_or(ModelError::NotPersisted {
            model: self.schema.table(),
        })?;
        primary.to_storage(&id)
    }

    /// Fails when the primary key field no longer matches the snapshot of a
    /// persisted record.
    fn check_primary_unchanged(&self) -> Result<(), ModelError> {
        let primary = self.schema.primary();
        if !self.exists {
            return Ok(());
        }
        let (Some(stored), Some(current)) =
            (self.saved.get(primary.name()), self.fields.get(primary.name()))
        else {
            return Ok(());
        };
        if primary.to_storage(current).ok().as_ref() != Some(stored) {
            return Err(ModelError::PrimaryKeyChanged {
                model: self.schema.table(),
            });
        }
        Ok(())
    }

    /// Whether a defined column differs from what was last loaded or saved.
    pub fn is_dirty(&self, name: &str) -> bool {
        let Some(column) = self.schema.column(name) else {
            return false;
        };
        let Some(value) = self.fields.get(column.name()) else {
            return false;
        };
        match column.to_storage(value) {
            Ok(stored) => self.saved.get(column.name()) != Some(&stored),
            Err(_) => true,
        }
    }

    /// Every writable column that [`save`](Self::save) would include in an
    /// UPDATE right now.
    pub fn dirty_columns(&self) -> Vec<&'static str> {
        self.schema
            .columns()
            .iter()
            .filter(|column| !column.is_auto_increment() && self.is_dirty(column.name()))
            .map(|column| column.name())
            .collect()
    }

    pub(crate) fn relation(&self, field: &str) -> Option<&RelationSlot> {
        self.relations.get(field)
    }

    pub(crate) fn relation_mut(&mut self, field: &str) -> Option<&mut RelationSlot> {
        self.relations.get_mut(field)
    }

    pub(crate) fn put_relation(&mut self, field: &'static str, slot: RelationSlot) {
        self.relations.insert(field, slot);
    }

    pub(crate) fn remove_relation(&mut self, field: &str) {
        self.relations.remove(field);
    }

    /// Writes pending changes.
    ///
    /// Verifies loaded relations against their foreign keys, fills
    /// generated and conventional timestamp columns, then issues one INSERT
    /// (transient record) or one UPDATE limited to the changed columns.
    /// Returns `false` without touching the database when nothing changed.
    ///
    /// On insert `createdOn` is filled when undefined and `updatedAt` is
    /// always set. On an update that changes other columns `updatedAt` is
    /// refreshed, unless the caller assigned it since the last save.
    ///
    /// # Errors
    ///
    /// Returns `RelationInvariantViolation`, `PrimaryKeyAssigned`,
    /// `PrimaryKeyChanged`, `MissingPrimaryKey`, `MissingColumn`, `TypeMismatch`, `Deleted`, or the
    /// database error. Nothing is written when any of these is returned
    /// before the statement runs.
    pub async fn save(&mut self, db: &Database) -> Result<bool, ModelError> {
        let schema = self.schema;
        let model = schema.table();
        if self.deleted {
            return Err(ModelError::Deleted { model });
        }

        self.check_relations()?;

        let primary = schema.primary();
        let has_id = self.primary_key().is_some();
        if !has_id && self.exists {
            return Err(ModelError::MissingPrimaryKey { model });
        }
        if has_id && !self.exists && primary.is_auto_increment() {
            return Err(ModelError::PrimaryKeyAssigned { model });
        }
        self.check_primary_unchanged()?;

        let now = Utc::now().naive_utc().trunc_subsecs(0);
        if !self.exists {
            for column in schema.columns() {
                if !self.fields.contains_key(column.name()) {
                    if let Some(value) = column.generate() {
                        self.fields.insert(column.name(), value);
                    }
                }
            }
            if let Some(column) = schema.created_column() {
                self.fields
                    .entry(column.name())
                    .or_insert(FieldValue::DateTime(now));
            }
            if let Some(column) = schema.updated_column() {
                self.fields.insert(column.name(), FieldValue::DateTime(now));
            }
        }

        let mut changes: Vec<(&'static str, Value)> = Vec::new();
        for column in schema.columns() {
            if column.is_auto_increment() {
                continue;
            }
            let Some(value) = self.fields.get(column.name()) else {
                if !self.exists {
                    return Err(ModelError::MissingColumn {
                        model,
                        column: column.name(),
                    });
                }
                continue;
            };
            let stored = column.to_storage(value)?;
            if !self.exists || self.saved.get(column.name()) != Some(&stored) {
                changes.push((column.name(), stored));
            }
        }

        // Only touch the update timestamp when something else changed, so
        // an unmodified instance still saves as a no-op. A value the caller
        // assigned since the last save wins over the clock.
        if self.exists && !changes.is_empty() {
            if let Some(column) = schema.updated_column() {
                if !changes.iter().any(|(name, _)| *name == column.name()) {
                    let value = FieldValue::DateTime(now);
                    let stored = column.to_storage(&value)?;
                    self.fields.insert(column.name(), value);
                    if self.saved.get(column.name()) != Some(&stored) {
                        changes.push((column.name(), stored));
                    }
                }
            }
        }

        if changes.is_empty() {
            tracing::debug!(model, "no modified columns, skipping save");
            return Ok(false);
        }

        let table = quote_ident(model);
        let names: Vec<&'static str> = changes.iter().map(|(name, _)| *name).collect();
        let mut values: Vec<Value> = changes.into_iter().map(|(_, value)| value).collect();

        if self.exists {
            let assignments = names
                .iter()
                .map(|name| format!("{} = ?", quote_ident(name)))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE {table} SET {assignments} WHERE {} = ?",
                quote_ident(primary.name())
            );
            values.push(self.primary_storage()?);

            tracing::debug!(model, columns = ?names, "updating model");
            let result = db.update(sql, values).await?;
            if result.changed_rows != 1 {
                tracing::warn!(
                    model,
                    changed_rows = result.changed_rows,
                    "update did not change exactly one row, check if the primary key still exists"
                );
            }
        } else {
            let columns = names
                .iter()
                .map(|name| quote_ident(name))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO {table} ({columns}) VALUES ({})",
                placeholders(names.len())
            );

            tracing::debug!(model, columns = ?names, "creating model");
            let result = db.insert(sql, values).await?;
            if primary.is_auto_increment() {
                if let Some(id) = result.insert_id {
                    self.fields.insert(primary.name(), FieldValue::Integer(id));
                    tracing::debug!(model, id, "assigned primary key");
                }
            }
        }

        self.mark_saved()?;
        Ok(true)
    }

    /// Deletes the row and leaves the record in the terminal deleted state.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::NotPersisted` for a record that does not exist
    /// in the database, `MissingPrimaryKey` if it was loaded without its
    /// key, `PrimaryKeyChanged` if the key was modified since, or the
    /// database error.
    pub async fn delete(&mut self, db: &Database) -> Result<(), ModelError> {
        let schema = self.schema;
        let model = schema.table();
        let primary = schema.primary();

        if self.exists && self.primary_key().is_none() {
            return Err(ModelError::MissingPrimaryKey { model });
        }
        if !self.exists {
            return Err(ModelError::NotPersisted { model });
        }
        self.check_primary_unchanged()?;

        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(model),
            quote_ident(primary.name())
        );
        let result = db.delete(sql, vec![self.primary_storage()?]).await?;
        if result.affected_rows != 1 {
            tracing::warn!(
                model,
                affected_rows = result.affected_rows,
                "delete did not remove exactly one row, check if the primary key still exists"
            );
        }

        self.exists = false;
        self.deleted = true;
        self.fields.remove(primary.name());
        self.saved.clear();
        Ok(())
    }

    fn check_relations(&self) -> Result<(), ModelError> {
        let model = self.schema.table();
        for key in self.schema.relations() {
            let violation = |reason: &str| ModelError::RelationInvariantViolation {
                model,
                relation: key.field,
                reason: reason.to_string(),
            };

            match self.relations.get(key.field) {
                None | Some(RelationSlot::Many(_)) => {}
                Some(RelationSlot::One(Some(target))) => {
                    let target = target.dyn_record();
                    if !target.exists_in_database() {
                        return Err(violation("the related model is not saved in the database"));
                    }
                    if self.fields.get(key.foreign_key) != target.primary_key().as_ref() {
                        return Err(violation(
                            "the foreign key was modified while the relation is loaded; \
                             unload the relation or change it with set_relation",
                        ));
                    }
                }
                Some(RelationSlot::One(None)) => {
                    if !matches!(self.fields.get(key.foreign_key), Some(FieldValue::Null)) {
                        return Err(violation(
                            "the foreign key was set while the relation is loaded as cleared; \
                             unload the relation or change it with set_relation",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn mark_saved(&mut self) -> Result<(), ModelError> {
        self.exists = true;

        for key in self.schema.relations() {
            match self.relations.get(key.field) {
                Some(RelationSlot::One(Some(target))) => {
                    let id = target.dyn_record().primary_key().unwrap_or(FieldValue::Null);
                    self.fields.insert(key.foreign_key, id);
                }
                Some(RelationSlot::One(None)) => {
                    self.fields.insert(key.foreign_key, FieldValue::Null);
                }
                None | Some(RelationSlot::Many(_)) => {}
            }
        }

        self.saved.clear();
        for column in self.schema.columns() {
            if let Some(value) = self.fields.get(column.name()) {
                self.saved.insert(column.name(), column.to_storage(value)?);
            }
        }
        Ok(())
    }
}
