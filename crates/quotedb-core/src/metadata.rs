//! Entity metadata: tables, columns, keys and relationships.
//!
//! Every mapped type describes itself with a `static` [`EntityMeta`]. A
//! [`MetadataRegistry`] collects the metadata of all entity types a session
//! factory knows about, checks that relationship targets resolve, and is then
//! frozen behind an `Arc` and shared read-only by every session.

use crate::entity::{Entity, ErasedRef};
use crate::error::{Error, Result, SchemaError, SchemaErrorKind};
use crate::row::Row;
use crate::types::SqlType;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// How primary keys are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationStrategy {
    /// The database assigns the key on INSERT and the gateway reports it back.
    #[default]
    Auto,
}

/// Default loading behaviour of a relationship when no load plan mentions it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Left unmaterialized until a load plan or an explicit initialize asks for it.
    #[default]
    Lazy,
    /// Always joined into queries on the owning entity.
    Eager,
}

/// A single mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Field name used in filter paths (e.g. `quoteText`).
    pub field: &'static str,
    /// Column name in the table.
    pub column: &'static str,
    pub sql_type: SqlType,
    pub nullable: bool,
    /// Maximum length in characters, enforced by a CHECK constraint.
    pub max_length: Option<u32>,
    pub primary_key: bool,
}

impl ColumnMeta {
    /// A generated integer primary key column.
    #[must_use]
    pub const fn id(column: &'static str) -> Self {
        Self {
            field: column,
            column,
            sql_type: SqlType::BigInt,
            nullable: false,
            max_length: None,
            primary_key: true,
        }
    }

    /// A required text column.
    #[must_use]
    pub const fn text(field: &'static str, column: &'static str) -> Self {
        Self {
            field,
            column,
            sql_type: SqlType::Text,
            nullable: false,
            max_length: None,
            primary_key: false,
        }
    }

    /// A required text column with a maximum length.
    #[must_use]
    pub const fn varchar(field: &'static str, column: &'static str, max_length: u32) -> Self {
        Self {
            field,
            column,
            sql_type: SqlType::VarChar(max_length),
            nullable: false,
            max_length: Some(max_length),
            primary_key: false,
        }
    }

    /// Mark the column nullable.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// A many-to-many link table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTableMeta {
    /// The link table name (e.g. `"QUOTE_SUBJECT"`).
    pub table: &'static str,
    /// Column pointing to the owning entity (e.g. `"quoteId"`).
    pub local_column: &'static str,
    /// Column pointing to the target entity (e.g. `"subjectId"`).
    pub remote_column: &'static str,
    /// Name of the foreign key on `local_column`.
    pub local_constraint: &'static str,
    /// Name of the foreign key on `remote_column`.
    pub remote_constraint: &'static str,
}

impl LinkTableMeta {
    #[must_use]
    pub const fn new(
        table: &'static str,
        local_column: &'static str,
        remote_column: &'static str,
    ) -> Self {
        Self {
            table,
            local_column,
            remote_column,
            local_constraint: "",
            remote_constraint: "",
        }
    }

    /// Name the two foreign keys of the link table.
    #[must_use]
    pub const fn constraints(mut self, local: &'static str, remote: &'static str) -> Self {
        self.local_constraint = local;
        self.remote_constraint = remote;
        self
    }
}

/// Shape of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// Many-to-one; this table carries the foreign key.
    ToOne {
        fk_column: &'static str,
        optional: bool,
        /// Name of the foreign key constraint.
        constraint: &'static str,
    },
    /// Many-to-many through a link table owned by this side.
    ToMany { link: LinkTableMeta },
}

/// One relationship of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipMeta {
    /// Relationship field name (e.g. `"attributedTo"`).
    pub name: &'static str,
    /// Entity name of the target (e.g. `"Author"`).
    pub target: &'static str,
    pub kind: RelationshipKind,
    pub fetch: FetchMode,
}

impl RelationshipMeta {
    /// A lazy, non-null many-to-one relationship.
    #[must_use]
    pub const fn to_one(
        name: &'static str,
        target: &'static str,
        fk_column: &'static str,
        constraint: &'static str,
    ) -> Self {
        Self {
            name,
            target,
            kind: RelationshipKind::ToOne {
                fk_column,
                optional: false,
                constraint,
            },
            fetch: FetchMode::Lazy,
        }
    }

    /// A lazy many-to-many relationship through `link`.
    #[must_use]
    pub const fn to_many(name: &'static str, target: &'static str, link: LinkTableMeta) -> Self {
        Self {
            name,
            target,
            kind: RelationshipKind::ToMany { link },
            fetch: FetchMode::Lazy,
        }
    }

    /// Allow the foreign key to be NULL.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        if let RelationshipKind::ToOne {
            fk_column,
            constraint,
            ..
        } = self.kind
        {
            self.kind = RelationshipKind::ToOne {
                fk_column,
                optional: true,
                constraint,
            };
        }
        self
    }

    /// Join this relationship even when no load plan asks for it.
    #[must_use]
    pub const fn eager(mut self) -> Self {
        self.fetch = FetchMode::Eager;
        self
    }

    pub const fn is_to_many(&self) -> bool {
        matches!(self.kind, RelationshipKind::ToMany { .. })
    }

    /// The foreign key column on the owning table, for to-one relationships.
    pub const fn fk_column(&self) -> Option<&'static str> {
        match self.kind {
            RelationshipKind::ToOne { fk_column, .. } => Some(fk_column),
            RelationshipKind::ToMany { .. } => None,
        }
    }

    /// The link table, for to-many relationships.
    pub const fn link(&self) -> Option<&LinkTableMeta> {
        match &self.kind {
            RelationshipKind::ToMany { link } => Some(link),
            RelationshipKind::ToOne { .. } => None,
        }
    }
}

/// Static description of one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityMeta {
    /// Entity name (e.g. `"Quote"`).
    pub name: &'static str,
    /// Table name (e.g. `"QUOTE"`).
    pub table: &'static str,
    pub generation: GenerationStrategy,
    /// All basic columns, primary key included.
    pub columns: &'static [ColumnMeta],
    pub relationships: &'static [RelationshipMeta],
}

impl EntityMeta {
    /// The primary key column.
    ///
    /// Registry validation guarantees exactly one exists.
    pub fn primary_key(&self) -> &'static ColumnMeta {
        let columns: &'static [ColumnMeta] = self.columns;
        columns
            .iter()
            .find(|c| c.primary_key)
            .unwrap_or(&columns[0])
    }

    /// Basic columns written by INSERT, in declaration order.
    pub fn insertable_columns(&self) -> impl Iterator<Item = &'static ColumnMeta> {
        let columns: &'static [ColumnMeta] = self.columns;
        columns.iter().filter(|c| !c.primary_key)
    }

    /// Look up a basic column by field name.
    pub fn column(&self, field: &str) -> Option<&'static ColumnMeta> {
        let columns: &'static [ColumnMeta] = self.columns;
        columns.iter().find(|c| c.field == field)
    }

    /// Look up a relationship by name.
    pub fn relationship(&self, name: &str) -> Option<&'static RelationshipMeta> {
        let relationships: &'static [RelationshipMeta] = self.relationships;
        relationships.iter().find(|r| r.name == name)
    }

    /// Relationships that carry a foreign key on this table.
    pub fn to_one_relationships(&self) -> impl Iterator<Item = &'static RelationshipMeta> {
        let relationships: &'static [RelationshipMeta] = self.relationships;
        relationships.iter().filter(|r| !r.is_to_many())
    }

    /// Relationships realized through a link table.
    pub fn to_many_relationships(&self) -> impl Iterator<Item = &'static RelationshipMeta> {
        let relationships: &'static [RelationshipMeta] = self.relationships;
        relationships.iter().filter(|r| r.is_to_many())
    }
}

/// Builds a fresh, unmanaged instance from a row whose columns are the bare
/// column names of the entity's table.
pub type HydrateFn = fn(&Row) -> Result<ErasedRef>;

fn hydrate<E: Entity>(row: &Row) -> Result<ErasedRef> {
    let entity = E::from_row(row)?;
    let erased: ErasedRef = Arc::new(RwLock::new(entity));
    Ok(erased)
}

/// A registered entity type.
#[derive(Clone, Copy)]
pub struct RegisteredEntity {
    pub meta: &'static EntityMeta,
    pub hydrate: HydrateFn,
}

impl std::fmt::Debug for RegisteredEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredEntity")
            .field("name", &self.meta.name)
            .field("table", &self.meta.table)
            .finish_non_exhaustive()
    }
}

/// Read-only catalog of every entity type a session factory maps.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entities: HashMap<&'static str, RegisteredEntity>,
    /// Registration order, used for deterministic DDL output.
    order: Vec<&'static str>,
}

impl MetadataRegistry {
    #[must_use]
    pub fn builder() -> MetadataRegistryBuilder {
        MetadataRegistryBuilder::default()
    }

    /// Look up an entity by name.
    pub fn get(&self, name: &str) -> Option<&RegisteredEntity> {
        self.entities.get(name)
    }

    /// Look up an entity by name, failing with a schema error when unknown.
    pub fn entity(&self, name: &str) -> Result<&RegisteredEntity> {
        self.get(name).ok_or_else(|| {
            Error::Schema(SchemaError {
                kind: SchemaErrorKind::Invalid,
                message: format!("entity '{}' is not registered", name),
            })
        })
    }

    /// Metadata of the target of `rel`.
    pub fn target(&self, rel: &RelationshipMeta) -> Result<&'static EntityMeta> {
        self.entity(rel.target).map(|e| e.meta)
    }

    /// All registered entities in registration order.
    pub fn entities(&self) -> impl Iterator<Item = &RegisteredEntity> {
        self.order.iter().filter_map(|name| self.entities.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Collects entity types before freezing them into a [`MetadataRegistry`].
#[derive(Debug, Default)]
pub struct MetadataRegistryBuilder {
    registry: MetadataRegistry,
}

impl MetadataRegistryBuilder {
    /// Register an entity type.
    #[must_use]
    pub fn register<E: Entity>(mut self) -> Self {
        let meta = E::META;
        if self
            .registry
            .entities
            .insert(
                meta.name,
                RegisteredEntity {
                    meta,
                    hydrate: hydrate::<E>,
                },
            )
            .is_none()
        {
            self.registry.order.push(meta.name);
        }
        self
    }

    /// Validate and freeze the registry.
    ///
    /// Every entity must have exactly one primary key column and every
    /// relationship must point at a registered entity.
    pub fn build(self) -> Result<Arc<MetadataRegistry>> {
        let registry = self.registry;
        for entity in registry.entities() {
            let meta = entity.meta;
            let pk_count = meta.columns.iter().filter(|c| c.primary_key).count();
            if pk_count != 1 {
                return Err(invalid(format!(
                    "entity '{}' must declare exactly one primary key column, found {}",
                    meta.name, pk_count
                )));
            }
            for rel in meta.relationships {
                if registry.get(rel.target).is_none() {
                    return Err(invalid(format!(
                        "relationship '{}.{}' targets unregistered entity '{}'",
                        meta.name, rel.name, rel.target
                    )));
                }
                if meta.column(rel.name).is_some() {
                    return Err(invalid(format!(
                        "'{}.{}' is declared both as a column and a relationship",
                        meta.name, rel.name
                    )));
                }
            }
        }
        tracing::debug!(entities = registry.len(), "Metadata registry built");
        Ok(Arc::new(registry))
    }
}

fn invalid(message: String) -> Error {
    Error::Schema(SchemaError {
        kind: SchemaErrorKind::Invalid,
        message,
    })
}
