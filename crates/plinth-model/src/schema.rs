//! Static per-type registration of columns and relations.
//!
//! Every model type builds one [`Schema`] the first time it is used and
//! keeps it for the life of the process:
//!
//! ```rust,ignore
//! fn schema() -> &'static Schema {
//!     static SCHEMA: OnceLock<Schema> = OnceLock::new();
//!     SCHEMA.get_or_init(|| {
//!         Schema::builder("users")
//!             .column(Column::integer("id").primary())
//!             .column(Column::string("email"))
//!             .column(Column::integer("organizationId").nullable())
//!             .many_to_one(&User::ORGANIZATION)
//!             .build()
//!     })
//! }
//! ```

use std::collections::HashSet;

use plinth_db::quote_ident;

use crate::column::{Column, ColumnType};
use crate::error::ModelError;
use crate::relation::ManyToOneRelation;

/// Column names filled with the insert time when left undefined.
const CREATED_COLUMNS: &[&str] = &["createdAt", "createdOn"];
/// Column names refreshed with the write time.
const UPDATED_COLUMNS: &[&str] = &["updatedAt", "updatedOn"];

/// The part of a many-to-one relation the save path needs: which relation
/// slot mirrors which foreign-key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationKey {
    pub field: &'static str,
    pub foreign_key: &'static str,
}

/// Columns and relations of one model type.
#[derive(Debug)]
pub struct Schema {
    table: &'static str,
    columns: Vec<Column>,
    primary: usize,
    relations: Vec<RelationKey>,
    created: Option<usize>,
    updated: Option<usize>,
}

impl Schema {
    pub fn builder(table: &'static str) -> SchemaBuilder {
        SchemaBuilder {
            table,
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name() == name)
    }

    pub fn primary(&self) -> &Column {
        &self.columns[self.primary]
    }

    pub fn relations(&self) -> &[RelationKey] {
        &self.relations
    }

    pub(crate) fn created_column(&self) -> Option<&Column> {
        self.created.map(|idx| &self.columns[idx])
    }

    pub(crate) fn updated_column(&self) -> Option<&Column> {
        self.updated.map(|idx| &self.columns[idx])
    }

    /// Select list for every registered column, aliased into `namespace`.
    ///
    /// Produces `"ns"."id" AS "ns.id", "ns"."name" AS "ns.name", ...`, which
    /// [`Row`](plinth_db::Row) splits back into the `ns` namespace.
    pub fn default_select(&self, namespace: &str) -> String {
        select_list(namespace, self.columns.iter().map(Column::name))
    }

    /// Like [`default_select`](Self::default_select), leaving out `excluded`.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::EmptySelection` when nothing is left to select.
    pub fn select_columns_without(
        &self,
        namespace: &str,
        excluded: &[&str],
    ) -> Result<String, ModelError> {
        let names: Vec<&str> = self
            .columns
            .iter()
            .map(Column::name)
            .filter(|name| !excluded.contains(name))
            .collect();
        if names.is_empty() {
            return Err(ModelError::EmptySelection { model: self.table });
        }
        Ok(select_list(namespace, names.into_iter()))
    }
}

fn select_list<'a>(namespace: &str, names: impl Iterator<Item = &'a str>) -> String {
    let ns = quote_ident(namespace);
    names
        .map(|name| {
            format!(
                "{ns}.{} AS {}",
                quote_ident(name),
                quote_ident(&format!("{namespace}.{name}"))
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collects columns and relations for a [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    table: &'static str,
    columns: Vec<Column>,
    relations: Vec<RelationKey>,
}

impl SchemaBuilder {
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Registers a many-to-one relation so `save()` keeps its foreign key in
    /// sync with the loaded relation.
    pub fn many_to_one<O, T>(mut self, relation: &ManyToOneRelation<O, T>) -> Self {
        self.relations.push(relation.key());
        self
    }

    /// Validates the registration.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidSchema` unless there is exactly one
    /// primary column, column names are unique, and every relation's
    /// foreign key is a registered column.
    pub fn try_build(self) -> Result<Schema, ModelError> {
        let invalid = |reason: String| ModelError::InvalidSchema {
            table: self.table,
            reason,
        };

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name()) {
                return Err(invalid(format!("duplicate column {}", column.name())));
            }
        }

        let primaries: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.is_primary())
            .map(|(idx, _)| idx)
            .collect();
        let primary = match primaries.as_slice() {
            [idx] => *idx,
            [] => return Err(invalid("no primary column".to_string())),
            _ => return Err(invalid("more than one primary column".to_string())),
        };

        for relation in &self.relations {
            if !seen.contains(relation.foreign_key) {
                return Err(invalid(format!(
                    "relation {} uses unregistered foreign key {}",
                    relation.field, relation.foreign_key
                )));
            }
        }

        let find_timestamp = |names: &[&str]| {
            self.columns.iter().position(|column| {
                column.column_type() == ColumnType::DateTime && names.contains(&column.name())
            })
        };
        let created = find_timestamp(CREATED_COLUMNS);
        let updated = find_timestamp(UPDATED_COLUMNS);

        Ok(Schema {
            table: self.table,
            columns: self.columns,
            primary,
            relations: self.relations,
            created,
            updated,
        })
    }

    /// Validates and builds the schema.
    ///
    /// # Panics
    ///
    /// Panics if the registration is invalid; see [`try_build`](Self::try_build).
    pub fn build(self) -> Schema {
        match self.try_build() {
            Ok(schema) => schema,
            Err(e) => panic!("{e}"),
        }
    }
}
