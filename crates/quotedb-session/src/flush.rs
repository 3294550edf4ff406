//! Flush: writing the unit of work to the database.
//!
//! - INSERT parent-first: the targets of to-one references staged in the same
//!   flush are inserted before their dependents; generated keys are read back
//!   and the instances enter the identity map
//! - link-table rows for the to-many relationships of new instances go out as
//!   one batch once every endpoint has a key
//! - UPDATE in staging order, replacing the link rows of loaded collections
//! - DELETE child-first, removing link rows that mention the instance first

use crate::identity_map::{EntityKey, IdentityMap};
use crate::unit_of_work::PendingOp;
use quotedb_core::{
    Connection, Cx, Dialect, EntityMeta, ErasedRef, Error, MetadataRegistry, Outcome, Result,
    SessionErrorKind, Value, same_instance, try_outcome, try_result,
};

/// Counts of what a flush wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushResult {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub linked: usize,
}

impl FlushResult {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted + self.linked
    }
}

/// Execute `ops` on `conn` and register new instances in `identity`.
///
/// Every instance that received a generated key is pushed to `inserted`,
/// including those inserted before a failing statement.
#[tracing::instrument(level = "debug", skip_all, fields(ops = ops.len()))]
pub async fn execute<C: Connection>(
    cx: &Cx,
    conn: &C,
    registry: &MetadataRegistry,
    ops: Vec<PendingOp>,
    identity: &mut IdentityMap,
    inserted: &mut Vec<ErasedRef>,
) -> Outcome<FlushResult, Error> {
    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    let mut deletes = Vec::new();
    for op in ops {
        match op {
            PendingOp::Insert(o) => inserts.push(o),
            PendingOp::Update(o) => updates.push(o),
            PendingOp::Delete(o) => deletes.push(o),
        }
    }

    let dialect = conn.dialect();
    let mut result = FlushResult::default();

    let ordered = try_result!(order_inserts(inserts, identity));
    for object in &ordered {
        let (sql, params) = try_result!(insert_statement(object, dialect));
        tracing::trace!(sql = %sql, "Executing INSERT");
        let id = try_outcome!(conn.insert(cx, &sql, &params).await);
        object.set_id(id);
        inserted.push(object.clone());
        identity.put_if_absent(EntityKey::new(object.meta().name, id), object.clone());
        result.inserted += 1;
    }

    let mut links = Vec::new();
    for object in &ordered {
        try_result!(link_statements(object, dialect, &mut links));
    }
    if !links.is_empty() {
        tracing::debug!(count = links.len(), "Inserting link rows");
        try_outcome!(conn.batch(cx, &links).await);
        result.linked = links.len();
    }

    for object in &updates {
        let statements = try_result!(update_statements(object, dialect));
        for (sql, params) in &statements {
            tracing::trace!(sql = %sql, "Executing UPDATE");
            try_outcome!(conn.execute(cx, sql, params).await);
        }
        result.updated += 1;
    }

    for object in order_deletes(deletes, registry) {
        let statements = try_result!(delete_statements(&object, registry, dialect));
        for (sql, params) in &statements {
            tracing::trace!(sql = %sql, "Executing DELETE");
            try_outcome!(conn.execute(cx, sql, params).await);
        }
        if let Some(key) = EntityKey::of(&object) {
            identity.remove(&key);
        }
        result.deleted += 1;
    }

    tracing::debug!(
        inserted = result.inserted,
        updated = result.updated,
        deleted = result.deleted,
        linked = result.linked,
        "Flush complete"
    );
    Outcome::Ok(result)
}

/// Topologically sort pending inserts so referenced instances come first.
///
/// Ties keep staging order. A to-one target that is neither staged nor
/// persisted is a [`SessionErrorKind::TransientReference`].
fn order_inserts(inserts: Vec<ErasedRef>, identity: &IdentityMap) -> Result<Vec<ErasedRef>> {
    let n = inserts.len();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0_usize; n];

    for (i, object) in inserts.iter().enumerate() {
        let meta = object.meta();
        for rel in meta.to_one_relationships() {
            for target in object.targets(rel.name) {
                if let Some(j) = inserts.iter().position(|o| same_instance(o, &target)) {
                    if j != i {
                        dependents[j].push(i);
                        in_degree[i] += 1;
                    }
                } else if target.id().is_none() {
                    return Err(transient_reference(meta, rel.name, &target));
                } else if !identity.contains_instance(&target) {
                    tracing::trace!(
                        entity = meta.name,
                        relationship = rel.name,
                        "Reference to an instance outside this session"
                    );
                }
            }
        }
        for rel in meta.to_many_relationships() {
            for target in object.targets(rel.name) {
                if target.id().is_none() && !inserts.iter().any(|o| same_instance(o, &target)) {
                    return Err(transient_reference(meta, rel.name, &target));
                }
            }
        }
    }

    let mut ordered = Vec::with_capacity(n);
    let mut done = vec![false; n];
    while ordered.len() < n {
        let Some(next) = (0..n).find(|&i| !done[i] && in_degree[i] == 0) else {
            return Err(Error::Custom(
                "dependency cycle between pending inserts".to_string(),
            ));
        };
        done[next] = true;
        for &dependent in &dependents[next] {
            in_degree[dependent] -= 1;
        }
        ordered.push(inserts[next].clone());
    }
    Ok(ordered)
}

/// Order deletes so dependents go before the rows they reference.
fn order_deletes(mut deletes: Vec<ErasedRef>, registry: &MetadataRegistry) -> Vec<ErasedRef> {
    // Stable sort keeps staging order within a depth.
    deletes.sort_by_key(|o| std::cmp::Reverse(depth(o.meta(), registry, 0)));
    deletes
}

fn depth(meta: &'static EntityMeta, registry: &MetadataRegistry, guard: usize) -> usize {
    if guard > registry.len() {
        return 0;
    }
    meta.to_one_relationships()
        .filter_map(|rel| registry.target(rel).ok())
        .filter(|target| target.name != meta.name)
        .map(|target| 1 + depth(target, registry, guard + 1))
        .max()
        .unwrap_or(0)
}

fn transient_reference(meta: &EntityMeta, relationship: &str, target: &ErasedRef) -> Error {
    Error::session(
        SessionErrorKind::TransientReference,
        format!(
            "{}.{} refers to a transient {} that was not persisted",
            meta.name,
            relationship,
            target.meta().name
        ),
    )
}

fn insert_statement(object: &ErasedRef, dialect: Dialect) -> Result<(String, Vec<Value>)> {
    let meta = object.meta();
    let mut columns: Vec<&str> = meta.insertable_columns().map(|c| c.column).collect();
    let mut params = object.column_values();
    if params.len() != columns.len() {
        return Err(Error::Custom(format!(
            "{} produced {} values for {} columns",
            meta.name,
            params.len(),
            columns.len()
        )));
    }
    for rel in meta.to_one_relationships() {
        if let Some(fk) = rel.fk_column() {
            columns.push(fk);
            params.push(Value::from(object.foreign_id(rel.name)));
        }
    }

    let table = dialect.quote_identifier(meta.table);
    if columns.is_empty() {
        return Ok((format!("INSERT INTO {} DEFAULT VALUES", table), params));
    }
    let names: Vec<String> = columns.iter().map(|c| dialect.quote_identifier(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| dialect.placeholder(i)).collect();
    Ok((
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            names.join(", "),
            placeholders.join(", ")
        ),
        params,
    ))
}

fn link_insert(dialect: Dialect, table: &str, local: &str, remote: &str) -> String {
    format!(
        "INSERT INTO {} ({}, {}) VALUES ({}, {})",
        dialect.quote_identifier(table),
        dialect.quote_identifier(local),
        dialect.quote_identifier(remote),
        dialect.placeholder(1),
        dialect.placeholder(2)
    )
}

fn link_statements(
    object: &ErasedRef,
    dialect: Dialect,
    out: &mut Vec<(String, Vec<Value>)>,
) -> Result<()> {
    let meta = object.meta();
    let Some(owner_id) = object.id() else {
        return Ok(());
    };
    for rel in meta.to_many_relationships() {
        let Some(link) = rel.link() else {
            continue;
        };
        let sql = link_insert(dialect, link.table, link.local_column, link.remote_column);
        for target in object.targets(rel.name) {
            let Some(target_id) = target.id() else {
                return Err(transient_reference(meta, rel.name, &target));
            };
            out.push((sql.clone(), vec![Value::BigInt(owner_id), Value::BigInt(target_id)]));
        }
    }
    Ok(())
}

fn update_statements(object: &ErasedRef, dialect: Dialect) -> Result<Vec<(String, Vec<Value>)>> {
    let meta = object.meta();
    let Some(id) = object.id() else {
        return Err(Error::session(
            SessionErrorKind::NotManaged,
            format!("cannot update a {} without an id", meta.name),
        ));
    };

    let mut assignments = Vec::new();
    let mut params = object.column_values();
    for (i, column) in meta.insertable_columns().enumerate() {
        assignments.push(format!(
            "{} = {}",
            dialect.quote_identifier(column.column),
            dialect.placeholder(i + 1)
        ));
    }
    for rel in meta.to_one_relationships() {
        if let Some(fk) = rel.fk_column() {
            params.push(Value::from(object.foreign_id(rel.name)));
            assignments.push(format!(
                "{} = {}",
                dialect.quote_identifier(fk),
                dialect.placeholder(params.len())
            ));
        }
    }

    let mut statements = Vec::new();
    if !assignments.is_empty() {
        params.push(Value::BigInt(id));
        statements.push((
            format!(
                "UPDATE {} SET {} WHERE {} = {}",
                dialect.quote_identifier(meta.table),
                assignments.join(", "),
                dialect.quote_identifier(meta.primary_key().column),
                dialect.placeholder(params.len())
            ),
            params,
        ));
    }

    for rel in meta.to_many_relationships() {
        let Some(link) = rel.link() else {
            continue;
        };
        if !object.is_loaded(rel.name) {
            continue;
        }
        statements.push((
            format!(
                "DELETE FROM {} WHERE {} = {}",
                dialect.quote_identifier(link.table),
                dialect.quote_identifier(link.local_column),
                dialect.placeholder(1)
            ),
            vec![Value::BigInt(id)],
        ));
    }
    link_statements(object, dialect, &mut statements)?;
    Ok(statements)
}

fn delete_statements(
    object: &ErasedRef,
    registry: &MetadataRegistry,
    dialect: Dialect,
) -> Result<Vec<(String, Vec<Value>)>> {
    let meta = object.meta();
    let Some(id) = object.id() else {
        return Ok(Vec::new());
    };
    let mut statements = Vec::new();
    let mut unlink = |table: &str, column: &str| {
        statements.push((
            format!(
                "DELETE FROM {} WHERE {} = {}",
                dialect.quote_identifier(table),
                dialect.quote_identifier(column),
                dialect.placeholder(1)
            ),
            vec![Value::BigInt(id)],
        ));
    };

    for rel in meta.to_many_relationships() {
        if let Some(link) = rel.link() {
            unlink(link.table, link.local_column);
        }
    }
    for owner in registry.entities() {
        for rel in owner.meta.to_many_relationships() {
            if rel.target != meta.name {
                continue;
            }
            if let Some(link) = rel.link() {
                unlink(link.table, link.remote_column);
            }
        }
    }
    statements.push((
        format!(
            "DELETE FROM {} WHERE {} = {}",
            dialect.quote_identifier(meta.table),
            dialect.quote_identifier(meta.primary_key().column),
            dialect.placeholder(1)
        ),
        vec![Value::BigInt(id)],
    ));
    Ok(statements)
}
