//! Namespaced result rows.
//!
//! SQLite reports one flat list of result columns, so joined tables are told
//! apart by aliasing their columns as `"namespace.column"`. A [`Row`] splits
//! every result column name at its first `.`; names without a dot land in
//! the unnamed namespace [`UNNAMESPACED`].

use std::collections::BTreeMap;

use rusqlite::types::Value;

/// Namespace for result columns that carry no `namespace.` prefix.
pub const UNNAMESPACED: &str = "";

/// The column values of a single namespace within a row, keyed by column name.
pub type Fields = BTreeMap<String, Value>;

/// One result row, grouped by namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    namespaces: BTreeMap<String, Fields>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under a raw result column name such as `"users.id"`.
    pub fn insert(&mut self, column_name: &str, value: Value) {
        let (namespace, column) = match column_name.split_once('.') {
            Some((namespace, column)) => (namespace, column),
            None => (UNNAMESPACED, column_name),
        };
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(column.to_string(), value);
    }

    /// Returns the columns selected under `namespace`, if any were.
    pub fn get(&self, namespace: &str) -> Option<&Fields> {
        self.namespaces.get(namespace)
    }

    /// Returns a single value, e.g. `row.value("users", "id")`.
    pub fn value(&self, namespace: &str, column: &str) -> Option<&Value> {
        self.get(namespace).and_then(|fields| fields.get(column))
    }

    /// Iterates the namespace names present in this row.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }
}
