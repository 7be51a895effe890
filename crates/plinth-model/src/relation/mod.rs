//! Relation descriptors.
//!
//! A relation field on an instance is in one of three observable states:
//! not loaded (never fetched or explicitly unloaded), loaded and cleared,
//! or loaded and set to a persisted instance. [`RelationState`] reports
//! which one for a many-to-one relation.

mod many_to_many;
mod many_to_one;

pub use many_to_many::{LinkRoles, ManyToManyRelation};
pub use many_to_one::ManyToOneRelation;

/// Loaded state of a many-to-one relation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationState<T> {
    NotLoaded,
    Cleared,
    Set(T),
}

impl<T> RelationState<T> {
    pub fn is_loaded(&self) -> bool {
        !matches!(self, Self::NotLoaded)
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// The related instance, if the relation is loaded and set.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Set(value) => Some(value),
            Self::NotLoaded | Self::Cleared => None,
        }
    }
}
