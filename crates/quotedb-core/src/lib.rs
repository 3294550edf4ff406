//! Core types and traits for QuoteDB.
//!
//! This crate provides the foundational abstractions shared by every other crate
//! in the workspace:
//!
//! - `Connection` trait, the SQL gateway the rest of the stack talks to
//! - `Value` and `Row` for parameters and result sets
//! - `EntityMeta` / `MetadataRegistry` describing tables, columns and relationships
//! - `Entity` trait plus the `Reference` / `Collection` relationship fields
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod entity;
pub mod error;
pub mod metadata;
pub mod projection;
pub mod recording;
pub mod relationship;
pub mod row;
pub mod types;
pub mod value;

pub use connection::{Connection, Dialect, IsolationLevel};
pub use entity::{
    Entity, EntityRef, ErasedRef, ManagedObject, downcast, erase, read_entity, same_instance,
    write_entity,
};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, PlanError, PlanErrorKind,
    PoolError, PoolErrorKind, QueryError, QueryErrorKind, Result, SchemaError, SchemaErrorKind,
    SessionError, SessionErrorKind, TypeError,
};
pub use metadata::{
    ColumnMeta, EntityMeta, FetchMode, GenerationStrategy, HydrateFn, LinkTableMeta,
    MetadataRegistry, MetadataRegistryBuilder, RegisteredEntity, RelationshipKind,
    RelationshipMeta,
};
pub use projection::Project;
pub use recording::{RecordingConnection, StatementLog};
pub use relationship::{Collection, Reference, RelationSlot};
pub use row::{ColumnInfo, FromValue, Row};
pub use types::SqlType;
pub use value::Value;

/// Propagate a non-`Ok` [`Outcome`] out of the enclosing async function.
///
/// `Outcome` has four variants, so `?` cannot be used directly; this macro
/// unwraps `Ok` and returns `Err`, `Cancelled` and `Panicked` unchanged.
#[macro_export]
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            $crate::Outcome::Ok(value) => value,
            $crate::Outcome::Err(e) => return $crate::Outcome::Err(e),
            $crate::Outcome::Cancelled(r) => return $crate::Outcome::Cancelled(r),
            $crate::Outcome::Panicked(p) => return $crate::Outcome::Panicked(p),
        }
    };
}

/// Lift a [`Result`] into the enclosing `Outcome`-returning function.
#[macro_export]
macro_rules! try_result {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => return $crate::Outcome::Err(e.into()),
        }
    };
}
