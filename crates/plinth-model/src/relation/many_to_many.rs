use std::fmt;
use std::marker::PhantomData;

use plinth_db::{quote_ident, Database, Value};

use crate::error::ModelError;
use crate::model::{downcast, DynModel, Model};
use crate::record::RelationSlot;
use crate::value::FieldValue;

/// How the two link columns of a many-to-many relation are told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRoles {
    /// The two sides live in different tables; the column names differ
    /// already.
    Distinct,
    /// Suffixes appended to the owner and target link columns. Required
    /// when both sides are the same table.
    Tagged {
        owner: &'static str,
        target: &'static str,
    },
}

impl LinkRoles {
    fn suffixes(self) -> (&'static str, &'static str) {
        match self {
            Self::Distinct => ("", ""),
            Self::Tagged { owner, target } => (owner, target),
        }
    }
}

/// A link-table edge from `A` (the owner) to any number of `B`.
///
/// The link table is named after both tables, sorted and joined with `_`.
/// Each link column is the table name followed by its capitalized primary
/// key name, plus the role suffix:
///
/// ```rust,ignore
/// impl Member {
///     // "members_registrations" with membersId / registrationsId
///     pub const REGISTRATIONS: ManyToManyRelation<Member, Registration> =
///         ManyToManyRelation::new("registrations");
///     // "members_members" with membersIdA / membersIdB
///     pub const FRIENDS: ManyToManyRelation<Member, Member> =
///         ManyToManyRelation::self_referential("friends");
/// }
/// ```
///
/// Every mutation is a single statement with no surrounding transaction.
/// When the relation is loaded on the owner, the in-memory list is only
/// updated if the statement touched exactly the expected number of link
/// rows; otherwise the relation is unloaded and
/// `ModelError::UnresolvedRaceCondition` is returned so the caller can
/// reload and retry.
pub struct ManyToManyRelation<A, B> {
    field: &'static str,
    roles: LinkRoles,
    _marker: PhantomData<fn() -> (A, B)>,
}

impl<A, B> ManyToManyRelation<A, B> {
    pub const fn new(field: &'static str) -> Self {
        Self::with_roles(field, LinkRoles::Distinct)
    }

    /// A relation between rows of the same table, with link columns
    /// suffixed `A` (owner) and `B` (target).
    pub const fn self_referential(field: &'static str) -> Self {
        Self::with_roles(
            field,
            LinkRoles::Tagged {
                owner: "A",
                target: "B",
            },
        )
    }

    pub const fn with_roles(field: &'static str, roles: LinkRoles) -> Self {
        Self {
            field,
            roles,
            _marker: PhantomData,
        }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn roles(&self) -> LinkRoles {
        self.roles
    }
}

impl<A: Model, B: Model> ManyToManyRelation<A, B> {
    pub fn link_table(&self) -> String {
        let mut tables = [A::schema().table(), B::schema().table()];
        tables.sort_unstable();
        tables.join("_")
    }

    /// Link column holding the owner's primary key.
    pub fn link_column_a(&self) -> String {
        link_column::<A>(self.roles.suffixes().0)
    }

    /// Link column holding the target's primary key.
    pub fn link_column_b(&self) -> String {
        link_column::<B>(self.roles.suffixes().1)
    }

    fn link_columns(&self) -> Result<(String, String), ModelError> {
        let (a, b) = (self.link_column_a(), self.link_column_b());
        if a == b {
            return Err(ModelError::InvalidSchema {
                table: A::schema().table(),
                reason: format!(
                    "relation {} links a table to itself; declare it with role suffixes",
                    self.field
                ),
            });
        }
        Ok((a, b))
    }

    /// Two `LEFT JOIN`s bringing the targets in as `target_alias`, through
    /// the link table aliased as `target_alias_link`.
    pub fn join_clause(&self, owner_alias: &str, target_alias: &str) -> String {
        let owner = A::schema();
        let target = B::schema();
        let link = quote_ident(&format!("{target_alias}_link"));
        let alias = quote_ident(target_alias);
        format!(
            "LEFT JOIN {} AS {link} ON {link}.{} = {}.{} \
             LEFT JOIN {} AS {alias} ON {alias}.{} = {link}.{}",
            quote_ident(&self.link_table()),
            quote_ident(&self.link_column_a()),
            quote_ident(owner_alias),
            quote_ident(owner.primary().name()),
            quote_ident(target.table()),
            quote_ident(target.primary().name()),
            quote_ident(&self.link_column_b()),
        )
    }

    pub fn is_loaded(&self, owner: &A) -> bool {
        matches!(
            owner.record().relation(self.field),
            Some(RelationSlot::Many(_))
        )
    }

    /// The loaded targets, or `None` while the relation is not loaded.
    pub fn get<'a>(&self, owner: &'a A) -> Option<Vec<&'a B>> {
        match owner.record().relation(self.field) {
            Some(RelationSlot::Many(targets)) => Some(
                targets
                    .iter()
                    .filter_map(|target| downcast::<B>(&**target))
                    .collect(),
            ),
            None | Some(RelationSlot::One(_)) => None,
        }
    }

    /// Marks the relation as not loaded.
    pub fn unload(&self, owner: &mut A) {
        owner.record_mut().remove_relation(self.field);
    }

    /// Fetches every linked target in link insertion order and marks the
    /// relation as loaded with exactly that list.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::NotPersisted` if `owner` has no primary key, or
    /// the database error.
    pub async fn load(&self, db: &Database, owner: &mut A) -> Result<Vec<B>, ModelError> {
        let (column_a, column_b) = self.link_columns()?;
        let id = owner.record().primary_storage()?;
        let target = B::schema();
        let link = quote_ident(&self.link_table());
        let alias = quote_ident(self.field);

        let sql = format!(
            "SELECT {} FROM {link} JOIN {} AS {alias} ON {alias}.{} = {link}.{} \
             WHERE {link}.{} = ? ORDER BY {link}.rowid",
            B::default_select(self.field),
            quote_ident(target.table()),
            quote_ident(target.primary().name()),
            quote_ident(&column_b),
            quote_ident(&column_a),
        );
        let rows = db.select(sql, vec![id]).await?;
        let targets = B::from_rows(&rows, self.field)?;

        let boxed = targets
            .iter()
            .map(|target| Box::new(target.clone()) as Box<dyn DynModel>)
            .collect();
        owner
            .record_mut()
            .put_relation(self.field, RelationSlot::Many(boxed));
        Ok(targets)
    }

    /// Inserts one link row per distinct target in a single statement.
    /// Targets repeated in `targets` are linked once.
    ///
    /// # Errors
    ///
    /// Returns `NotPersisted` for an unsaved owner, `UnsavedRelationTarget`
    /// for an unsaved target, `UnresolvedRaceCondition` when the relation is
    /// loaded and not every link row was inserted, or the database error.
    pub async fn link(&self, db: &Database, owner: &mut A, targets: &[&B]) -> Result<(), ModelError> {
        let (column_a, column_b) = self.link_columns()?;
        let owner_id = self.owner_id(owner)?;
        let targets = self.distinct_targets(targets)?;
        if targets.is_empty() {
            return Ok(());
        }

        let mut values = Vec::with_capacity(targets.len() * 2);
        for (_, target_id) in &targets {
            values.push(owner_id.clone());
            values.push(target_id.clone());
        }
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}, {}) VALUES {}",
            quote_ident(&self.link_table()),
            quote_ident(&column_a),
            quote_ident(&column_b),
            vec!["(?, ?)"; targets.len()].join(", ")
        );
        let result = db.insert(sql, values).await?;

        self.reconcile(owner, targets.len(), result.affected_rows, |loaded| {
            loaded.extend(
                targets
                    .iter()
                    .map(|(target, _)| Box::new((*target).clone()) as Box<dyn DynModel>),
            );
        })
    }

    /// Deletes the link rows between `owner` and `targets`. Targets repeated
    /// in `targets` count once.
    ///
    /// # Errors
    ///
    /// Same as [`link`](Self::link).
    pub async fn unlink(
        &self,
        db: &Database,
        owner: &mut A,
        targets: &[&B],
    ) -> Result<(), ModelError> {
        let (column_a, column_b) = self.link_columns()?;
        let owner_id = self.owner_id(owner)?;
        let targets = self.distinct_targets(targets)?;
        if targets.is_empty() {
            return Ok(());
        }

        let removed: Vec<Option<FieldValue>> = targets
            .iter()
            .map(|(target, _)| target.primary_key())
            .collect();
        let sql = format!(
            "DELETE FROM {} WHERE {} = ? AND {} IN ({})",
            quote_ident(&self.link_table()),
            quote_ident(&column_a),
            quote_ident(&column_b),
            plinth_db::placeholders(targets.len())
        );
        let mut values = Vec::with_capacity(targets.len() + 1);
        values.push(owner_id);
        values.extend(targets.iter().map(|(_, target_id)| target_id.clone()));
        let result = db.delete(sql, values).await?;

        self.reconcile(owner, targets.len(), result.affected_rows, |loaded| {
            loaded.retain(|target| !removed.contains(&target.dyn_record().primary_key()));
        })
    }

    /// Deletes every link row of `owner` and marks the relation as loaded
    /// and empty, whether or not it was loaded before.
    ///
    /// # Errors
    ///
    /// Returns `NotPersisted` for an unsaved owner, or the database error.
    pub async fn clear(&self, db: &Database, owner: &mut A) -> Result<(), ModelError> {
        let (column_a, _) = self.link_columns()?;
        let owner_id = self.owner_id(owner)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(&self.link_table()),
            quote_ident(&column_a)
        );
        db.delete(sql, vec![owner_id]).await?;

        owner
            .record_mut()
            .put_relation(self.field, RelationSlot::Many(Vec::new()));
        Ok(())
    }

    fn owner_id(&self, owner: &A) -> Result<Value, ModelError> {
        if !owner.exists_in_database() {
            return Err(ModelError::NotPersisted {
                model: A::schema().table(),
            });
        }
        owner.record().primary_storage()
    }

    /// Saved targets paired with their stored key, first occurrence kept.
    fn distinct_targets<'t>(&self, targets: &[&'t B]) -> Result<Vec<(&'t B, Value)>, ModelError> {
        let mut distinct: Vec<(&'t B, Value)> = Vec::with_capacity(targets.len());
        for target in targets {
            if !target.exists_in_database() {
                return Err(ModelError::UnsavedRelationTarget {
                    relation: self.field,
                });
            }
            let id = target.record().primary_storage()?;
            if !distinct.iter().any(|(_, seen)| *seen == id) {
                distinct.push((*target, id));
            }
        }
        Ok(distinct)
    }

    /// Applies `update` to the loaded list if the write touched exactly
    /// `expected` rows. A mismatch unloads the relation.
    fn reconcile(
        &self,
        owner: &mut A,
        expected: usize,
        affected: usize,
        update: impl FnOnce(&mut Vec<Box<dyn DynModel>>),
    ) -> Result<(), ModelError> {
        if !self.is_loaded(owner) {
            return Ok(());
        }

        if affected != expected {
            tracing::warn!(
                relation = self.field,
                expected,
                affected,
                "link rows changed concurrently, unloading relation"
            );
            self.unload(owner);
            return Err(ModelError::UnresolvedRaceCondition {
                relation: self.field,
                expected,
                affected,
            });
        }

        if let Some(RelationSlot::Many(loaded)) = owner.record_mut().relation_mut(self.field) {
            update(loaded);
        }
        Ok(())
    }
}

fn link_column<M: Model>(suffix: &str) -> String {
    let schema = M::schema();
    let primary = schema.primary().name();
    let mut chars = primary.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    format!("{}{capitalized}{suffix}", schema.table())
}

impl<A, B> Clone for ManyToManyRelation<A, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, B> Copy for ManyToManyRelation<A, B> {}

impl<A, B> fmt::Debug for ManyToManyRelation<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManyToManyRelation")
            .field("field", &self.field)
            .field("roles", &self.roles)
            .finish()
    }
}
