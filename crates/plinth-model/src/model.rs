//! The typed model facade.

use std::any::Any;
use std::fmt;

use async_trait::async_trait;
use plinth_db::{Database, Fields, Row};

use crate::error::ModelError;
use crate::record::{Record, RelationSlot};
use crate::relation::{ManyToManyRelation, ManyToOneRelation};
use crate::schema::Schema;
use crate::value::FieldValue;

/// A persisted model type.
///
/// Implementors own a [`Record`] and a static [`Schema`]; every persistence
/// operation is provided on top of those four methods. Typed field
/// accessors are plain methods on the implementing struct that read and
/// write the record by column name.
///
/// ```rust,ignore
/// #[derive(Debug, Clone)]
/// struct Member {
///     record: Record,
/// }
///
/// impl Model for Member {
///     fn schema() -> &'static Schema { /* see Schema */ }
///     fn from_record(record: Record) -> Self { Self { record } }
///     fn record(&self) -> &Record { &self.record }
///     fn record_mut(&mut self) -> &mut Record { &mut self.record }
/// }
///
/// impl Member {
///     fn name(&self) -> Option<&str> {
///         self.record.get("name").and_then(FieldValue::as_str)
///     }
///
///     fn set_name(&mut self, name: &str) {
///         self.record.set("name", name);
///     }
/// }
/// ```
#[async_trait]
pub trait Model: Clone + fmt::Debug + Send + Sync + 'static {
    /// The columns and relations of this type, built once.
    fn schema() -> &'static Schema;

    fn from_record(record: Record) -> Self;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    /// A transient instance with every column undefined.
    fn new() -> Self {
        Self::from_record(Record::new(Self::schema()))
    }

    /// Hydrates an instance from one row namespace.
    ///
    /// Returns `None` when the primary key cell is `NULL` or missing.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::TypeMismatch` if a stored value does not fit.
    fn from_row(fields: &Fields) -> Result<Option<Self>, ModelError> {
        Ok(Record::from_fields(Self::schema(), fields)?.map(Self::from_record))
    }

    /// Hydrates the `namespace` part of every row, skipping rows where it is
    /// absent or has a `NULL` primary key.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::TypeMismatch` if a stored value does not fit.
    fn from_rows(rows: &[Row], namespace: &str) -> Result<Vec<Self>, ModelError> {
        let mut models = Vec::new();
        for row in rows {
            let Some(fields) = row.get(namespace) else {
                continue;
            };
            if let Some(model) = Self::from_row(fields)? {
                models.push(model);
            }
        }
        Ok(models)
    }

    /// Select list of every column, aliased into `namespace`.
    fn default_select(namespace: &str) -> String {
        Self::schema().default_select(namespace)
    }

    /// Select list of every column except `excluded`, aliased into
    /// `namespace`.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::EmptySelection` when every column is excluded.
    fn select_columns_without(namespace: &str, excluded: &[&str]) -> Result<String, ModelError> {
        Self::schema().select_columns_without(namespace, excluded)
    }

    fn exists_in_database(&self) -> bool {
        self.record().exists_in_database()
    }

    fn primary_key(&self) -> Option<FieldValue> {
        self.record().primary_key()
    }

    /// See [`Record::save`].
    async fn save(&mut self, db: &Database) -> Result<bool, ModelError> {
        self.record_mut().save(db).await
    }

    /// See [`Record::delete`].
    async fn delete(&mut self, db: &Database) -> Result<(), ModelError> {
        self.record_mut().delete(db).await
    }

    /// Loads `target` into the relation and copies its primary key into the
    /// foreign key column.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnsavedRelationTarget` if `target` is not saved,
    /// or `InvalidSchema` if the relation was never registered on the
    /// schema.
    fn set_relation<T: Model>(
        &mut self,
        relation: &ManyToOneRelation<Self, T>,
        target: &T,
    ) -> Result<(), ModelError> {
        self.set_optional_relation(relation, Some(target))
    }

    /// Like [`set_relation`](Self::set_relation); `None` loads the relation
    /// as cleared and nulls the foreign key.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnsavedRelationTarget` if `target` is not saved,
    /// or `InvalidSchema` if the relation was never registered on the
    /// schema.
    fn set_optional_relation<T: Model>(
        &mut self,
        relation: &ManyToOneRelation<Self, T>,
        target: Option<&T>,
    ) -> Result<(), ModelError> {
        let schema = Self::schema();
        if !schema.relations().contains(&relation.key()) {
            return Err(ModelError::InvalidSchema {
                table: schema.table(),
                reason: format!(
                    "relation {} on {} is not registered with the schema",
                    relation.field(),
                    relation.foreign_key()
                ),
            });
        }

        let (id, slot) = match target {
            Some(target) => {
                if !target.exists_in_database() {
                    return Err(ModelError::UnsavedRelationTarget {
                        relation: relation.field(),
                    });
                }
                let id = target.primary_key().ok_or(ModelError::NotPersisted {
                    model: T::schema().table(),
                })?;
                let boxed: Box<dyn DynModel> = Box::new(target.clone());
                (id, RelationSlot::One(Some(boxed)))
            }
            None => (FieldValue::Null, RelationSlot::One(None)),
        };

        let record = self.record_mut();
        record.set(relation.foreign_key(), id);
        record.put_relation(relation.field(), slot);
        Ok(())
    }

    /// Loads the relation as cleared and nulls the foreign key; the next
    /// `save()` writes `NULL`.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidSchema` if the relation was never
    /// registered on the schema.
    fn unset_relation<T: Model>(
        &mut self,
        relation: &ManyToOneRelation<Self, T>,
    ) -> Result<(), ModelError> {
        self.set_optional_relation(relation, None)
    }

    /// Marks the relation as not loaded. The foreign key keeps its value and
    /// is no longer checked against a related instance.
    fn unload_relation<T: Model>(&mut self, relation: &ManyToOneRelation<Self, T>) {
        self.record_mut().remove_relation(relation.field());
    }

    /// Marks a many-to-many relation as loaded with exactly `targets`.
    /// Nothing is written; use the relation's `link`/`unlink` for that.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnsavedRelationTarget` if any target is not saved.
    fn set_many_relation<T: Model>(
        &mut self,
        relation: &ManyToManyRelation<Self, T>,
        targets: Vec<T>,
    ) -> Result<(), ModelError> {
        if targets.iter().any(|target| !target.exists_in_database()) {
            return Err(ModelError::UnsavedRelationTarget {
                relation: relation.field(),
            });
        }
        let boxed = targets
            .into_iter()
            .map(|target| Box::new(target) as Box<dyn DynModel>)
            .collect();
        self.record_mut()
            .put_relation(relation.field(), RelationSlot::Many(boxed));
        Ok(())
    }
}

/// Object-safe view of any [`Model`], used to hold related instances of
/// arbitrary types inside a [`Record`].
pub trait DynModel: Any + Send + Sync + fmt::Debug {
    fn dyn_record(&self) -> &Record;

    fn as_any(&self) -> &dyn Any;

    fn clone_box(&self) -> Box<dyn DynModel>;
}

impl<M: Model> DynModel for M {
    fn dyn_record(&self) -> &Record {
        self.record()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn DynModel> {
        Box::new(self.clone())
    }
}

pub(crate) fn downcast<T: Model>(target: &dyn DynModel) -> Option<&T> {
    target.as_any().downcast_ref::<T>()
}
