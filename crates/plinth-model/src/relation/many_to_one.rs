use std::fmt;
use std::marker::PhantomData;

use plinth_db::quote_ident;

use crate::model::{downcast, Model};
use crate::record::RelationSlot;
use crate::relation::RelationState;
use crate::schema::RelationKey;

/// A foreign-key edge from `O` (the owner, holding the key) to `T`.
///
/// Declared once as a constant and registered on the owner's schema with
/// [`SchemaBuilder::many_to_one`](crate::SchemaBuilder::many_to_one):
///
/// ```rust,ignore
/// impl Member {
///     pub const ORGANIZATION: ManyToOneRelation<Member, Organization> =
///         ManyToOneRelation::new("organization", "organizationId");
/// }
/// ```
///
/// There is no `load`: hydrate the target by adding
/// [`join_clause`](Self::join_clause) to a query and calling
/// [`Model::from_row`] on the joined namespace.
pub struct ManyToOneRelation<O, T> {
    field: &'static str,
    foreign_key: &'static str,
    _marker: PhantomData<fn() -> (O, T)>,
}

impl<O, T> ManyToOneRelation<O, T> {
    /// `field` names the relation slot, `foreign_key` the owner's column
    /// holding the target's primary key.
    pub const fn new(field: &'static str, foreign_key: &'static str) -> Self {
        Self {
            field,
            foreign_key,
            _marker: PhantomData,
        }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn foreign_key(&self) -> &'static str {
        self.foreign_key
    }

    pub(crate) fn key(&self) -> RelationKey {
        RelationKey {
            field: self.field,
            foreign_key: self.foreign_key,
        }
    }
}

impl<O: Model, T: Model> ManyToOneRelation<O, T> {
    /// `LEFT JOIN` bringing the target in as `target_alias`.
    pub fn join_clause(&self, owner_alias: &str, target_alias: &str) -> String {
        let target = T::schema();
        let alias = quote_ident(target_alias);
        format!(
            "LEFT JOIN {} AS {alias} ON {alias}.{} = {}.{}",
            quote_ident(target.table()),
            quote_ident(target.primary().name()),
            quote_ident(owner_alias),
            quote_ident(self.foreign_key)
        )
    }

    pub fn is_loaded(&self, owner: &O) -> bool {
        matches!(
            owner.record().relation(self.field),
            Some(RelationSlot::One(_))
        )
    }

    pub fn is_set(&self, owner: &O) -> bool {
        matches!(
            owner.record().relation(self.field),
            Some(RelationSlot::One(Some(_)))
        )
    }

    pub fn get<'a>(&self, owner: &'a O) -> RelationState<&'a T> {
        match owner.record().relation(self.field) {
            Some(RelationSlot::One(None)) => RelationState::Cleared,
            Some(RelationSlot::One(Some(target))) => {
                downcast::<T>(&**target).map_or(RelationState::NotLoaded, RelationState::Set)
            }
            None | Some(RelationSlot::Many(_)) => RelationState::NotLoaded,
        }
    }
}

impl<O, T> Clone for ManyToOneRelation<O, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O, T> Copy for ManyToOneRelation<O, T> {}

impl<O, T> fmt::Debug for ManyToOneRelation<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManyToOneRelation")
            .field("field", &self.field)
            .field("foreign_key", &self.foreign_key)
            .finish()
    }
}
