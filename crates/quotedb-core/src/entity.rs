//! Mapped entity types and their type-erased managed form.
//!
//! An [`Entity`] is a plain Rust struct with a static [`EntityMeta`]. Sessions
//! hold instances as [`EntityRef`] (`Arc<RwLock<E>>`) so that every reference
//! to the same row inside a session is literally the same object. The identity
//! map and the fetch assembler work over [`ErasedRef`], which erases the
//! concrete type behind the [`ManagedObject`] trait.

use crate::error::Result;
use crate::metadata::EntityMeta;
use crate::relationship::RelationSlot;
use crate::row::Row;
use crate::value::Value;
use std::any::Any;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A managed or transient instance of `E`, shared by identity.
pub type EntityRef<E> = Arc<RwLock<E>>;

/// A managed instance of some entity type.
pub type ErasedRef = Arc<dyn ManagedObject>;

/// A type mapped to a table.
///
/// Implementations are hand-written next to the struct; see the `quotedb`
/// crate for `Author`, `Subject` and `Quote`.
pub trait Entity: Send + Sync + Sized + 'static {
    /// Static table and relationship description.
    const META: &'static EntityMeta;

    /// The generated primary key, `None` while transient.
    fn id(&self) -> Option<i64>;

    /// Store the key generated on INSERT; `None` when that INSERT is rolled back.
    fn set_id(&mut self, id: Option<i64>);

    /// Values of [`EntityMeta::insertable_columns`], in the same order.
    fn column_values(&self) -> Vec<Value>;

    /// Build an instance from a row keyed by plain column names.
    ///
    /// To-one relationships come back unloaded with the foreign key from the
    /// row (or empty when it is NULL); collections come back unloaded.
    fn from_row(row: &Row) -> Result<Self>;

    /// The relationship field called `name`.
    fn relation(&self, name: &str) -> Option<&dyn RelationSlot>;

    /// The relationship field called `name`, mutably.
    fn relation_mut(&mut self, name: &str) -> Option<&mut dyn RelationSlot>;

    /// Wrap the instance so it can be shared by identity.
    fn into_ref(self) -> EntityRef<Self> {
        Arc::new(RwLock::new(self))
    }
}

/// Object-safe view of a managed instance.
pub trait ManagedObject: Send + Sync + 'static {
    fn meta(&self) -> &'static EntityMeta;

    fn id(&self) -> Option<i64>;

    fn set_id(&self, id: i64);

    /// Forget a generated key whose INSERT did not commit.
    fn clear_id(&self);

    fn column_values(&self) -> Vec<Value>;

    /// Key of the target of a to-one relationship, loaded or not.
    fn foreign_id(&self, relationship: &str) -> Option<i64>;

    fn is_loaded(&self, relationship: &str) -> bool;

    /// Materialized targets of a relationship, in collection order.
    fn targets(&self, relationship: &str) -> Vec<ErasedRef>;

    /// Attach a target to a relationship. Attaching twice is a no-op.
    fn attach(&self, relationship: &str, target: ErasedRef) -> Result<()>;

    /// Mark a relationship as materialized, possibly with no targets.
    fn mark_loaded(&self, relationship: &str);

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub(crate) fn read<E>(lock: &RwLock<E>) -> RwLockReadGuard<'_, E> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write<E>(lock: &RwLock<E>) -> RwLockWriteGuard<'_, E> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl<E: Entity> ManagedObject for RwLock<E> {
    fn meta(&self) -> &'static EntityMeta {
        E::META
    }

    fn id(&self) -> Option<i64> {
        read(self).id()
    }

    fn set_id(&self, id: i64) {
        write(self).set_id(Some(id));
    }

    fn clear_id(&self) {
        write(self).set_id(None);
    }

    fn column_values(&self) -> Vec<Value> {
        read(self).column_values()
    }

    fn foreign_id(&self, relationship: &str) -> Option<i64> {
        read(self)
            .relation(relationship)
            .and_then(|slot| slot.foreign_id())
    }

    fn is_loaded(&self, relationship: &str) -> bool {
        read(self)
            .relation(relationship)
            .is_some_and(|slot| slot.is_loaded())
    }

    fn targets(&self, relationship: &str) -> Vec<ErasedRef> {
        read(self)
            .relation(relationship)
            .map(|slot| slot.targets())
            .unwrap_or_default()
    }

    fn attach(&self, relationship: &str, target: ErasedRef) -> Result<()> {
        let mut guard = write(self);
        match guard.relation_mut(relationship) {
            Some(slot) => slot.attach(target),
            None => Err(crate::Error::Custom(format!(
                "{} has no relationship '{}'",
                E::META.name,
                relationship
            ))),
        }
    }

    fn mark_loaded(&self, relationship: &str) {
        if let Some(slot) = write(self).relation_mut(relationship) {
            slot.mark_loaded();
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Recover the concrete type of a managed instance.
pub fn downcast<E: Entity>(erased: &ErasedRef) -> Option<EntityRef<E>> {
    Arc::clone(erased).into_any().downcast::<RwLock<E>>().ok()
}

/// Erase the concrete type of an instance.
pub fn erase<E: Entity>(entity: &EntityRef<E>) -> ErasedRef {
    let erased: ErasedRef = Arc::clone(entity) as ErasedRef;
    erased
}

/// Identity comparison of two managed instances.
pub fn same_instance(a: &ErasedRef, b: &ErasedRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Read access to an entity, ignoring lock poisoning.
pub fn read_entity<E: Entity>(entity: &EntityRef<E>) -> RwLockReadGuard<'_, E> {
    read(entity)
}

/// Write access to an entity, ignoring lock poisoning.
pub fn write_entity<E: Entity>(entity: &EntityRef<E>) -> RwLockWriteGuard<'_, E> {
    write(entity)
}
