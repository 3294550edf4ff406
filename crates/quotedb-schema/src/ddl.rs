//! CREATE/DROP TABLE generation from entity metadata.
//!
//! Entity tables are ordered so that every table referenced by a foreign key
//! is created before the table that references it. Link tables of to-many
//! relationships come last. Drop order is the reverse.

use quotedb_core::{
    ColumnMeta, Dialect, EntityMeta, Error, LinkTableMeta, MetadataRegistry, RelationshipKind,
    Result, SchemaError, SchemaErrorKind, SqlType,
};

/// A table the metadata expects to exist, with the columns it must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedTable {
    pub name: &'static str,
    pub columns: Vec<&'static str>,
}

/// Generates DDL for a fixed set of entities.
#[derive(Debug, Clone)]
pub struct DdlGenerator {
    entities: Vec<&'static EntityMeta>,
    dialect: Dialect,
}

impl DdlGenerator {
    /// A generator over `entities` for SQLite.
    pub fn new(entities: Vec<&'static EntityMeta>) -> Self {
        Self {
            entities,
            dialect: Dialect::Sqlite,
        }
    }

    /// A generator over every entity in `registry`, in registration order.
    pub fn from_registry(registry: &MetadataRegistry) -> Self {
        Self::new(registry.entities().map(|e| e.meta).collect())
    }

    /// Generate DDL for another dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    fn target(&self, owner: &EntityMeta, name: &str) -> Result<&'static EntityMeta> {
        self.entities
            .iter()
            .copied()
            .find(|e| e.name == name)
            .ok_or_else(|| {
                invalid(format!(
                    "entity '{}' references '{}', which has no table",
                    owner.name, name
                ))
            })
    }

    /// Entity tables, parents before children.
    pub fn creation_order(&self) -> Result<Vec<&'static EntityMeta>> {
        let mut ordered: Vec<&'static EntityMeta> = Vec::with_capacity(self.entities.len());
        let mut visiting: Vec<&'static str> = Vec::new();
        for entity in self.entities.iter().copied() {
            self.visit(entity, &mut visiting, &mut ordered)?;
        }
        Ok(ordered)
    }

    fn visit(
        &self,
        entity: &'static EntityMeta,
        visiting: &mut Vec<&'static str>,
        ordered: &mut Vec<&'static EntityMeta>,
    ) -> Result<()> {
        if ordered.iter().any(|e| e.name == entity.name) {
            return Ok(());
        }
        if visiting.contains(&entity.name) {
            return Err(invalid(format!(
                "foreign keys form a cycle through '{}'",
                entity.name
            )));
        }
        visiting.push(entity.name);
        for rel in entity.to_one_relationships() {
            if rel.target == entity.name {
                continue;
            }
            let parent = self.target(entity, rel.target)?;
            self.visit(parent, visiting, ordered)?;
        }
        visiting.pop();
        ordered.push(entity);
        Ok(())
    }

    /// Every link table with its owning and target entity.
    fn link_tables(
        &self,
    ) -> Result<Vec<(&'static EntityMeta, &'static LinkTableMeta, &'static EntityMeta)>> {
        let mut links = Vec::new();
        for owner in &self.entities {
            for rel in owner.to_many_relationships() {
                if let RelationshipKind::ToMany { link } = &rel.kind {
                    links.push((*owner, link, self.target(owner, rel.target)?));
                }
            }
        }
        Ok(links)
    }

    /// CREATE TABLE statements, parents first.
    pub fn create_statements(&self, if_not_exists: bool) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for entity in self.creation_order()? {
            statements.push(self.create_entity_table(entity, if_not_exists)?);
        }
        for (owner, link, target) in self.link_tables()? {
            statements.push(self.create_link_table(owner, link, target, if_not_exists));
        }
        Ok(statements)
    }

    /// DROP TABLE IF EXISTS statements, children first.
    pub fn drop_statements(&self) -> Result<Vec<String>> {
        let mut statements: Vec<String> = self
            .link_tables()?
            .into_iter()
            .map(|(_, link, _)| self.drop_table(link.table))
            .collect();
        for entity in self.creation_order()?.into_iter().rev() {
            statements.push(self.drop_table(entity.table));
        }
        Ok(statements)
    }

    /// Tables and columns a valid schema must contain.
    pub fn expected_tables(&self) -> Result<Vec<ExpectedTable>> {
        let mut tables = Vec::new();
        for entity in self.creation_order()? {
            let mut columns: Vec<&'static str> = entity.columns.iter().map(|c| c.column).collect();
            columns.extend(entity.to_one_relationships().filter_map(|r| r.fk_column()));
            tables.push(ExpectedTable {
                name: entity.table,
                columns,
            });
        }
        for (_, link, _) in self.link_tables()? {
            tables.push(ExpectedTable {
                name: link.table,
                columns: vec![link.local_column, link.remote_column],
            });
        }
        Ok(tables)
    }

    fn create_entity_table(&self, entity: &EntityMeta, if_not_exists: bool) -> Result<String> {
        let q = |name: &str| self.dialect.quote_identifier(name);
        let mut lines = Vec::new();
        let mut constraints = Vec::new();

        for column in entity.columns {
            lines.push(self.column_definition(column));
            if let Some(max) = column.max_length {
                constraints.push(format!(
                    "CONSTRAINT {} CHECK ({}({}) <= {})",
                    check_constraint_name(entity.table, column.column),
                    self.length_function(),
                    q(column.column),
                    max
                ));
            }
        }

        for rel in entity.to_one_relationships() {
            let RelationshipKind::ToOne {
                fk_column,
                optional,
                constraint,
            } = rel.kind
            else {
                continue;
            };
            let target = self.target(entity, rel.target)?;
            let null = if optional { "" } else { " NOT NULL" };
            lines.push(format!("{} BIGINT{}", q(fk_column), null));
            constraints.push(format!(
                "{}FOREIGN KEY ({}) REFERENCES {} ({})",
                constraint_prefix(constraint),
                q(fk_column),
                q(target.table),
                q(target.primary_key().column)
            ));
        }

        lines.extend(constraints);
        Ok(format!(
            "CREATE TABLE {}{} (\n  {}\n)",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            q(entity.table),
            lines.join(",\n  ")
        ))
    }

    fn create_link_table(
        &self,
        owner: &EntityMeta,
        link: &LinkTableMeta,
        target: &EntityMeta,
        if_not_exists: bool,
    ) -> String {
        let q = |name: &str| self.dialect.quote_identifier(name);
        let lines = [
            format!("{} BIGINT NOT NULL", q(link.local_column)),
            format!("{} BIGINT NOT NULL", q(link.remote_column)),
            format!(
                "PRIMARY KEY ({}, {})",
                q(link.local_column),
                q(link.remote_column)
            ),
            format!(
                "{}FOREIGN KEY ({}) REFERENCES {} ({})",
                constraint_prefix(link.local_constraint),
                q(link.local_column),
                q(owner.table),
                q(owner.primary_key().column)
            ),
            format!(
                "{}FOREIGN KEY ({}) REFERENCES {} ({})",
                constraint_prefix(link.remote_constraint),
                q(link.remote_column),
                q(target.table),
                q(target.primary_key().column)
            ),
        ];
        format!(
            "CREATE TABLE {}{} (\n  {}\n)",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            q(link.table),
            lines.join(",\n  ")
        )
    }

    fn column_definition(&self, column: &ColumnMeta) -> String {
        let name = self.dialect.quote_identifier(column.column);
        if column.primary_key {
            return match self.dialect {
                Dialect::Sqlite => format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", name),
                Dialect::Postgres => format!("{} BIGSERIAL PRIMARY KEY", name),
            };
        }
        let sql_type = match (self.dialect, column.sql_type) {
            (Dialect::Sqlite, SqlType::Boolean) => "INTEGER".to_string(),
            (_, other) => other.sql_name(),
        };
        let null = if column.nullable { "" } else { " NOT NULL" };
        format!("{} {}{}", name, sql_type, null)
    }

    fn length_function(&self) -> &'static str {
        match self.dialect {
            Dialect::Sqlite => "length",
            Dialect::Postgres => "char_length",
        }
    }

    fn drop_table(&self, table: &str) -> String {
        format!(
            "DROP TABLE IF EXISTS {}",
            self.dialect.quote_identifier(table)
        )
    }
}

/// Name of the CHECK constraint bounding `column` of `table`,
/// e.g. `CK_QUOTE_QUOTETEXT_LENGTH`.
pub fn check_constraint_name(table: &str, column: &str) -> String {
    format!(
        "CK_{}_{}_LENGTH",
        table.to_uppercase(),
        column.to_uppercase()
    )
}

fn constraint_prefix(name: &str) -> String {
    if name.is_empty() {
        String::new()
    } else {
        format!("CONSTRAINT {} ", name)
    }
}

fn invalid(message: String) -> Error {
    Error::Schema(SchemaError {
        kind: SchemaErrorKind::Invalid,
        message,
    })
}
