//! QuoteDB: a catalog of quotes, authors and subjects over a small
//! load-plan driven object/relational mapper.
//!
//! - [`entity`]: the mapped `Author`, `Subject` and `Quote` entities
//! - [`model`]: immutable value records and projection
//! - [`SessionFactory`]: configuration, connection pool, schema action and
//!   [`call_in_transaction`](SessionFactory::call_in_transaction)
//! - [`repository`]: finders with a fixed load plan, and upserts
//! - [`seed`]: sample data
//!
//! # Example
//!
//! ```ignore
//! use quotedb::prelude::*;
//!
//! let factory = try_outcome!(SessionFactory::open(&cx, FactoryConfig::default()).await);
//! let quotes = try_outcome!(
//!     factory
//!         .call_in_transaction(&cx, async |session| {
//!             try_result!(seed::insert_quotes(session));
//!             let found = try_outcome!(repository::find_quotes_by_author(session, &cx, "Ron Paul").await);
//!             Outcome::Ok(try_result!(found.project()))
//!         })
//!         .await
//! );
//! for quote in &quotes {
//!     println!("{quote}");
//! }
//! ```

pub mod config;
pub mod entity;
pub mod factory;
pub mod model;
pub mod repository;
pub mod seed;

pub use config::{CacheMode, DEFAULT_URL, Driver, FactoryConfig};
pub use factory::{FactoryConnection, QuoteSession, SessionFactory, catalog_registry};

pub use quotedb_core::{
    Connection, Cx, Entity, EntityRef, Error, Outcome, Project, Result, StatementLog, Value,
    try_outcome, try_result,
};
pub use quotedb_query::{LoadPlan, Query};
pub use quotedb_schema::SchemaAction;
pub use quotedb_session::{Session, SessionState};

/// Commonly used types.
pub mod prelude {
    pub use crate::model;
    pub use crate::{
        CacheMode, Cx, Entity, EntityRef, Error, FactoryConfig, LoadPlan, Outcome, Project, Query,
        QuoteSession, SchemaAction, Session, SessionFactory, repository, seed, try_outcome,
        try_result,
    };
}
