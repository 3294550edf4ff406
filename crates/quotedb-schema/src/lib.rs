//! Schema generation and schema actions for QuoteDB.
//!
//! This crate provides:
//! - CREATE TABLE generation from the metadata registry, with length CHECK
//!   constraints and named foreign keys
//! - Dependency-ordered creation and dropping of tables
//! - Validation of a live database against the metadata
//! - The schema action a session factory applies at startup

pub mod ddl;
pub mod introspect;

pub use ddl::{DdlGenerator, ExpectedTable, check_constraint_name};
pub use introspect::{table_columns, validate_tables};

use quotedb_core::{
    ConfigError, Connection, Cx, Error, MetadataRegistry, Outcome, try_outcome, try_result,
};
use std::fmt;
use std::str::FromStr;

/// What to do with the database schema when a session factory starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaAction {
    /// Leave the schema alone.
    #[default]
    None,
    /// Drop every mapped table, then create them again.
    DropAndCreate,
    /// Create missing tables.
    Create,
    /// Fail unless every mapped table and column exists.
    Validate,
}

impl SchemaAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            SchemaAction::None => "none",
            SchemaAction::DropAndCreate => "drop-and-create",
            SchemaAction::Create => "create",
            SchemaAction::Validate => "validate",
        }
    }
}

impl fmt::Display for SchemaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(SchemaAction::None),
            "drop-and-create" => Ok(SchemaAction::DropAndCreate),
            "create" => Ok(SchemaAction::Create),
            "validate" => Ok(SchemaAction::Validate),
            other => Err(Error::Config(ConfigError {
                message: format!(
                    "unknown schema action '{}' (expected none, drop-and-create, create or validate)",
                    other
                ),
                source: None,
            })),
        }
    }
}

/// Execute DDL statements in order.
pub async fn execute_all<C: Connection>(
    cx: &Cx,
    conn: &C,
    statements: &[String],
) -> Outcome<(), Error> {
    for sql in statements {
        tracing::trace!(sql = %sql, "DDL");
        try_outcome!(conn.execute(cx, sql, &[]).await);
    }
    Outcome::Ok(())
}

/// Create every mapped table that does not exist yet.
pub async fn create_all<C: Connection>(
    cx: &Cx,
    conn: &C,
    registry: &MetadataRegistry,
) -> Outcome<(), Error> {
    let statements = try_result!(DdlGenerator::from_registry(registry).create_statements(true));
    execute_all(cx, conn, &statements).await
}

/// Drop every mapped table, children first.
pub async fn drop_all<C: Connection>(
    cx: &Cx,
    conn: &C,
    registry: &MetadataRegistry,
) -> Outcome<(), Error> {
    let statements = try_result!(DdlGenerator::from_registry(registry).drop_statements());
    execute_all(cx, conn, &statements).await
}

/// Check the live database against the registry.
pub async fn validate<C: Connection>(
    cx: &Cx,
    conn: &C,
    registry: &MetadataRegistry,
) -> Outcome<(), Error> {
    let expected = try_result!(DdlGenerator::from_registry(registry).expected_tables());
    validate_tables(cx, conn, &expected).await
}

/// Apply `action` to the database behind `conn`.
#[tracing::instrument(level = "debug", skip(cx, conn, registry))]
pub async fn apply<C: Connection>(
    cx: &Cx,
    conn: &C,
    registry: &MetadataRegistry,
    action: SchemaAction,
) -> Outcome<(), Error> {
    match action {
        SchemaAction::None => Outcome::Ok(()),
        SchemaAction::DropAndCreate => {
            try_outcome!(drop_all(cx, conn, registry).await);
            create_all(cx, conn, registry).await
        }
        SchemaAction::Create => create_all(cx, conn, registry).await,
        SchemaAction::Validate => validate(cx, conn, registry).await,
    }
}
