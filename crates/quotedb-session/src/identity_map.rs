//! Identity map: one canonical instance per `(entity, id)` per session.
//!
//! The map is session-local and not shared across threads. Rows that hit an
//! existing key resolve to the instance already in the map; its scalar fields
//! are never overwritten (first read wins).

use quotedb_core::{Entity, EntityRef, ErasedRef, downcast, same_instance};
use std::collections::HashMap;
use std::fmt;

/// Identity of a managed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub entity: &'static str,
    pub id: i64,
}

impl EntityKey {
    pub const fn new(entity: &'static str, id: i64) -> Self {
        Self { entity, id }
    }

    /// The key of a managed instance, `None` while it has no id.
    pub fn of(object: &ErasedRef) -> Option<Self> {
        object.id().map(|id| Self::new(object.meta().name, id))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.id)
    }
}

/// Session-local `(entity, id) -> instance` table.
#[derive(Default)]
pub struct IdentityMap {
    entries: HashMap<EntityKey, ErasedRef>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&ErasedRef> {
        self.entries.get(key)
    }

    /// The managed instance of `E` with primary key `id`.
    pub fn get_typed<E: Entity>(&self, id: i64) -> Option<EntityRef<E>> {
        self.get(&EntityKey::new(E::META.name, id))
            .and_then(downcast::<E>)
    }

    /// Register `object` under `key` unless the key is taken.
    ///
    /// Returns the canonical instance for the key.
    pub fn put_if_absent(&mut self, key: EntityKey, object: ErasedRef) -> ErasedRef {
        self.entries.entry(key).or_insert(object).clone()
    }

    pub fn contains_key(&self, key: &EntityKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether this exact instance is the canonical one for its key.
    pub fn contains_instance(&self, object: &ErasedRef) -> bool {
        EntityKey::of(object)
            .and_then(|key| self.entries.get(&key))
            .is_some_and(|canonical| same_instance(canonical, object))
    }

    pub fn remove(&mut self, key: &EntityKey) -> Option<ErasedRef> {
        self.entries.remove(key)
    }

    /// Forget every instance; they become detached.
    pub fn remove_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort_by_key(|k| (k.entity, k.id));
        f.debug_struct("IdentityMap").field("keys", &keys).finish()
    }
}
