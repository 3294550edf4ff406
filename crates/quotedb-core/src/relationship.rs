//! Relationship fields.
//!
//! A relationship is either materialized or explicitly unmaterialized; nothing
//! is ever loaded behind the caller's back. [`Reference`] holds a to-one target
//! and [`Collection`] a to-many target set. Both implement [`RelationSlot`],
//! the type-erased interface the flush and the fetch assembler use.

use crate::entity::{Entity, EntityRef, ErasedRef, downcast, erase, read};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Type-erased access to one relationship field of an entity.
pub trait RelationSlot: Send + Sync {
    /// Whether the relationship has been materialized.
    fn is_loaded(&self) -> bool;

    /// Key of the to-one target, loaded or not. Always `None` for collections.
    fn foreign_id(&self) -> Option<i64>;

    /// Materialized targets.
    fn targets(&self) -> Vec<ErasedRef>;

    /// Attach a target.
    ///
    /// For a reference the first attached target wins; for a collection the
    /// target is appended unless the same instance is already present.
    fn attach(&mut self, target: ErasedRef) -> Result<()>;

    /// Mark as materialized without adding a target.
    fn mark_loaded(&mut self);
}

/// A to-one relationship field.
#[derive(Debug)]
pub enum Reference<E: Entity> {
    /// Not materialized; only the foreign key is known.
    Unloaded { id: i64 },
    /// Materialized, and the foreign key is NULL.
    Empty,
    /// Materialized.
    Loaded(EntityRef<E>),
}

impl<E: Entity> Reference<E> {
    /// Point at an existing (managed or transient) instance.
    pub fn new(target: &EntityRef<E>) -> Self {
        Reference::Loaded(Arc::clone(target))
    }

    pub const fn unloaded(id: i64) -> Self {
        Reference::Unloaded { id }
    }

    /// The target, if materialized.
    pub fn get(&self) -> Option<&EntityRef<E>> {
        match self {
            Reference::Loaded(target) => Some(target),
            _ => None,
        }
    }

    pub const fn is_loaded(&self) -> bool {
        !matches!(self, Reference::Unloaded { .. })
    }

    /// Key of the target, if it has one.
    pub fn id(&self) -> Option<i64> {
        match self {
            Reference::Unloaded { id } => Some(*id),
            Reference::Empty => None,
            Reference::Loaded(target) => read(target).id(),
        }
    }
}

impl<E: Entity> Clone for Reference<E> {
    fn clone(&self) -> Self {
        match self {
            Reference::Unloaded { id } => Reference::Unloaded { id: *id },
            Reference::Empty => Reference::Empty,
            Reference::Loaded(target) => Reference::Loaded(Arc::clone(target)),
        }
    }
}

impl<E: Entity> RelationSlot for Reference<E> {
    fn is_loaded(&self) -> bool {
        Reference::is_loaded(self)
    }

    fn foreign_id(&self) -> Option<i64> {
        self.id()
    }

    fn targets(&self) -> Vec<ErasedRef> {
        self.get().map(erase).into_iter().collect()
    }

    fn attach(&mut self, target: ErasedRef) -> Result<()> {
        if matches!(self, Reference::Loaded(_)) {
            return Ok(());
        }
        let typed = downcast::<E>(&target).ok_or_else(|| mismatch::<E>(&target))?;
        *self = Reference::Loaded(typed);
        Ok(())
    }

    fn mark_loaded(&mut self) {
        if matches!(self, Reference::Unloaded { .. }) {
            *self = Reference::Empty;
        }
    }
}

/// A to-many relationship field.
///
/// Elements keep first-appearance order and are unique by identity.
#[derive(Debug)]
pub enum Collection<E: Entity> {
    Unloaded,
    Loaded(Vec<EntityRef<E>>),
}

impl<E: Entity> Collection<E> {
    /// A materialized, empty collection.
    pub const fn empty() -> Self {
        Collection::Loaded(Vec::new())
    }

    /// A materialized collection; repeated instances are dropped.
    pub fn from_refs<'a>(targets: impl IntoIterator<Item = &'a EntityRef<E>>) -> Self {
        let mut collection = Self::empty();
        for target in targets {
            collection.push(target);
        }
        collection
    }

    /// The elements, if materialized.
    pub fn get(&self) -> Option<&[EntityRef<E>]> {
        match self {
            Collection::Loaded(items) => Some(items),
            Collection::Unloaded => None,
        }
    }

    pub const fn is_loaded(&self) -> bool {
        matches!(self, Collection::Loaded(_))
    }

    /// Add an element unless the same instance is already present.
    ///
    /// Returns `true` if the element was added. Pushing into an unloaded
    /// collection materializes it.
    pub fn push(&mut self, target: &EntityRef<E>) -> bool {
        if let Collection::Unloaded = self {
            *self = Self::empty();
        }
        match self {
            Collection::Loaded(items) => {
                if items.iter().any(|item| Arc::ptr_eq(item, target)) {
                    false
                } else {
                    items.push(Arc::clone(target));
                    true
                }
            }
            Collection::Unloaded => false,
        }
    }

    pub fn len(&self) -> usize {
        self.get().map_or(0, <[_]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Entity> Default for Collection<E> {
    fn default() -> Self {
        Collection::Unloaded
    }
}

impl<E: Entity> Clone for Collection<E> {
    fn clone(&self) -> Self {
        match self {
            Collection::Unloaded => Collection::Unloaded,
            Collection::Loaded(items) => Collection::Loaded(items.clone()),
        }
    }
}

impl<E: Entity> RelationSlot for Collection<E> {
    fn is_loaded(&self) -> bool {
        Collection::is_loaded(self)
    }

    fn foreign_id(&self) -> Option<i64> {
        None
    }

    fn targets(&self) -> Vec<ErasedRef> {
        self.get()
            .map(|items| items.iter().map(erase).collect())
            .unwrap_or_default()
    }

    fn attach(&mut self, target: ErasedRef) -> Result<()> {
        let typed = downcast::<E>(&target).ok_or_else(|| mismatch::<E>(&target))?;
        self.push(&typed);
        Ok(())
    }

    fn mark_loaded(&mut self) {
        if let Collection::Unloaded = self {
            *self = Self::empty();
        }
    }
}

fn mismatch<E: Entity>(target: &ErasedRef) -> Error {
    Error::Custom(format!(
        "cannot attach {} where {} is expected",
        target.meta().name,
        E::META.name
    ))
}
