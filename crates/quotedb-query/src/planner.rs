//! Single-statement fetch planning.
//!
//! [`plan`] turns a [`QuerySpec`] into one SELECT:
//!
//! 1. every basic column (and to-one foreign key) of the root, aliased
//!    `t0__<column>`;
//! 2. one LEFT OUTER JOIN per planned to-one relationship, two (root to link,
//!    link to target) per planned to-many relationship, each target's columns
//!    aliased by its own `t<n>__` prefix, recursively;
//! 3. filters: to-one paths through separate INNER JOINs (`f<n>`), to-many paths
//!    through `IN` sub-selects over the link table so fetched collections stay
//!    complete;
//! 4. ORDER BY the requested root columns, then the root key, then the key of
//!    every to-many node so collection order is stable.
//!
//! The returned [`NodePlan`] tree mirrors the joins and tells the assembler
//! which prefix belongs to which entity.

use crate::filter::{Filter, QuerySpec};
use crate::load_plan::PlanNode;
use quotedb_core::{
    Dialect, EntityMeta, Error, FetchMode, MetadataRegistry, PlanError, RelationshipKind,
    RelationshipMeta, Result, SqlType, Value,
};
use std::collections::HashMap;

/// One entity position in a planned statement.
#[derive(Debug, Clone)]
pub struct NodePlan {
    pub entity: &'static EntityMeta,
    /// Table alias; selected columns are named `<alias>__<column>`.
    pub alias: String,
    /// The relationship this node was reached through; `None` for the root.
    pub relationship: Option<&'static RelationshipMeta>,
    pub children: Vec<NodePlan>,
}

impl NodePlan {
    /// Column-name prefix of this node in the result set.
    pub fn prefix(&self) -> String {
        format!("{}__", self.alias)
    }

    pub fn is_to_many(&self) -> bool {
        self.relationship.is_some_and(RelationshipMeta::is_to_many)
    }

    /// Number of nodes in this subtree, itself included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(NodePlan::node_count).sum::<usize>()
    }

    fn any_to_many(&self) -> bool {
        self.is_to_many() || self.children.iter().any(NodePlan::any_to_many)
    }
}

/// A statement ready for the gateway plus the shape needed to assemble it.
#[derive(Debug, Clone)]
pub struct PlannedQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub root: NodePlan,
    /// Rows are a cartesian product and must be deduplicated on assembly.
    pub has_to_many: bool,
}

/// Plan `spec` as a single SQL statement.
pub fn plan(registry: &MetadataRegistry, spec: &QuerySpec, dialect: Dialect) -> Result<PlannedQuery> {
    let root_meta = spec.root;
    registry.entity(root_meta.name)?;
    spec.plan.validate(root_meta, registry)?;

    let mut counter = 0;
    let mut path = vec![root_meta.name];
    let root = build_node(registry, root_meta, None, spec.plan.nodes(), &mut path, &mut counter)?;

    let mut columns = Vec::new();
    select_columns(&root, dialect, &mut columns);

    let mut sql = format!(
        "SELECT {} FROM {} {}",
        columns.join(", "),
        dialect.quote_identifier(root_meta.table),
        root.alias
    );
    fetch_joins(registry, &root, dialect, &mut sql)?;

    let mut scope = FilterScope::new(registry, root_meta, dialect);
    let mut predicates = Vec::with_capacity(spec.filters.len());
    let mut filter_joins = Vec::new();
    let mut join_aliases = HashMap::new();
    for filter in &spec.filters {
        predicates.push(scope.resolve(filter, &root.alias, &mut filter_joins, &mut join_aliases)?);
    }
    for join in &filter_joins {
        sql.push_str(join);
    }
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }

    let order = order_clause(spec, &root, dialect)?;
    sql.push_str(" ORDER BY ");
    sql.push_str(&order.join(", "));

    let has_to_many = root.any_to_many();
    tracing::debug!(
        root = root_meta.name,
        nodes = root.node_count(),
        filters = spec.filters.len(),
        has_to_many,
        "Planned query"
    );
    tracing::trace!(sql = %sql, "Planned SQL");

    Ok(PlannedQuery {
        sql,
        params: scope.params,
        root,
        has_to_many,
    })
}

/// Plan the explicit load of one relationship of one instance.
///
/// `key` is the foreign key for a to-one relationship and the owner's primary
/// key for a to-many relationship. The returned root node is the target
/// entity, reached through `relationship`.
pub fn plan_relationship_load(
    registry: &MetadataRegistry,
    owner: &'static EntityMeta,
    relationship: &str,
    key: i64,
    dialect: Dialect,
) -> Result<PlannedQuery> {
    let Some(rel) = owner.relationship(relationship) else {
        return Err(Error::Plan(PlanError::invalid_load_plan(
            owner.name,
            relationship,
            format!("{} has no relationship '{}'", owner.name, relationship),
        )));
    };
    let target = registry.target(rel)?;
    let root = NodePlan {
        entity: target,
        alias: "t0".to_string(),
        relationship: Some(rel),
        children: Vec::new(),
    };
    let mut columns = Vec::new();
    select_columns(&root, dialect, &mut columns);
    let table = dialect.quote_identifier(target.table);
    let pk = dialect.quote_identifier(target.primary_key().column);

    let sql = match &rel.kind {
        RelationshipKind::ToOne { .. } => format!(
            "SELECT {} FROM {} t0 WHERE t0.{} = {}",
            columns.join(", "),
            table,
            pk,
            dialect.placeholder(1)
        ),
        RelationshipKind::ToMany { link } => format!(
            "SELECT {} FROM {} t0 INNER JOIN {} l0 ON l0.{} = t0.{} WHERE l0.{} = {} ORDER BY t0.{} ASC",
            columns.join(", "),
            table,
            dialect.quote_identifier(link.table),
            dialect.quote_identifier(link.remote_column),
            pk,
            dialect.quote_identifier(link.local_column),
            dialect.placeholder(1),
            pk
        ),
    };
    tracing::debug!(
        owner = owner.name,
        relationship,
        key,
        "Planned relationship load"
    );
    tracing::trace!(sql = %sql, "Planned SQL");

    Ok(PlannedQuery {
        sql,
        params: vec![Value::BigInt(key)],
        has_to_many: rel.is_to_many(),
        root,
    })
}

fn build_node(
    registry: &MetadataRegistry,
    meta: &'static EntityMeta,
    relationship: Option<&'static RelationshipMeta>,
    planned: &[PlanNode],
    path: &mut Vec<&'static str>,
    counter: &mut usize,
) -> Result<NodePlan> {
    let alias = format!("t{}", *counter);
    *counter += 1;
    let mut children = Vec::new();

    for node in planned {
        let Some(rel) = meta.relationship(&node.relationship) else {
            return Err(Error::Plan(PlanError::invalid_load_plan(
                meta.name,
                node.relationship.clone(),
                format!("{} has no relationship '{}'", meta.name, node.relationship),
            )));
        };
        let target = registry.target(rel)?;
        path.push(target.name);
        let child = build_node(registry, target, Some(rel), &node.nested, path, counter);
        path.pop();
        children.push(child?);
    }

    // Eager relationships join unless already planned or they would revisit
    // an entity on the current path.
    for rel in meta.relationships {
        if rel.fetch != FetchMode::Eager || planned.iter().any(|n| n.relationship == rel.name) {
            continue;
        }
        let target = registry.target(rel)?;
        if path.contains(&target.name) {
            continue;
        }
        path.push(target.name);
        let child = build_node(registry, target, Some(rel), &[], path, counter);
        path.pop();
        children.push(child?);
    }

    Ok(NodePlan {
        entity: meta,
        alias,
        relationship,
        children,
    })
}

fn select_columns(node: &NodePlan, dialect: Dialect, out: &mut Vec<String>) {
    let mut push = |column: &str| {
        out.push(format!(
            "{}.{} AS {}",
            node.alias,
            dialect.quote_identifier(column),
            dialect.quote_identifier(&format!("{}__{}", node.alias, column))
        ));
    };
    for column in node.entity.columns {
        push(column.column);
    }
    for rel in node.entity.to_one_relationships() {
        if let Some(fk) = rel.fk_column() {
            push(fk);
        }
    }
    for child in &node.children {
        select_columns(child, dialect, out);
    }
}

fn fetch_joins(
    registry: &MetadataRegistry,
    node: &NodePlan,
    dialect: Dialect,
    sql: &mut String,
) -> Result<()> {
    let parent_pk = dialect.quote_identifier(node.entity.primary_key().column);
    for child in &node.children {
        let Some(rel) = child.relationship else {
            continue;
        };
        let target = registry.target(rel)?;
        let target_table = dialect.quote_identifier(target.table);
        let target_pk = dialect.quote_identifier(target.primary_key().column);
        match &rel.kind {
            RelationshipKind::ToOne { fk_column, .. } => {
                sql.push_str(&format!(
                    " LEFT JOIN {} {} ON {}.{} = {}.{}",
                    target_table,
                    child.alias,
                    child.alias,
                    target_pk,
                    node.alias,
                    dialect.quote_identifier(fk_column)
                ));
            }
            RelationshipKind::ToMany { link } => {
                let link_alias = link_alias(&child.alias);
                sql.push_str(&format!(
                    " LEFT JOIN {} {} ON {}.{} = {}.{} LEFT JOIN {} {} ON {}.{} = {}.{}",
                    dialect.quote_identifier(link.table),
                    link_alias,
                    link_alias,
                    dialect.quote_identifier(link.local_column),
                    node.alias,
                    parent_pk,
                    target_table,
                    child.alias,
                    child.alias,
                    target_pk,
                    link_alias,
                    dialect.quote_identifier(link.remote_column)
                ));
            }
        }
        fetch_joins(registry, child, dialect, sql)?;
    }
    Ok(())
}

fn link_alias(alias: &str) -> String {
    format!("l{}", alias.trim_start_matches('t'))
}

fn order_clause(spec: &QuerySpec, root: &NodePlan, dialect: Dialect) -> Result<Vec<String>> {
    let root_pk = spec.root.primary_key();
    let mut order = Vec::new();
    let mut pk_ordered = false;
    for item in &spec.order {
        let Some(column) = spec.root.column(&item.field) else {
            return Err(Error::Plan(PlanError::invalid_filter(
                spec.root.name,
                item.field.clone(),
                format!("{} has no column '{}' to order by", spec.root.name, item.field),
            )));
        };
        pk_ordered |= column.primary_key;
        order.push(format!(
            "{}.{} {}",
            root.alias,
            dialect.quote_identifier(column.column),
            item.direction.as_sql()
        ));
    }
    if !pk_ordered {
        order.push(format!(
            "{}.{} ASC",
            root.alias,
            dialect.quote_identifier(root_pk.column)
        ));
    }
    collection_order(root, dialect, &mut order);
    Ok(order)
}

fn collection_order(node: &NodePlan, dialect: Dialect, out: &mut Vec<String>) {
    for child in &node.children {
        if child.is_to_many() {
            out.push(format!(
                "{}.{} ASC",
                child.alias,
                dialect.quote_identifier(child.entity.primary_key().column)
            ));
        }
        collection_order(child, dialect, out);
    }
}

/// Resolves filter paths into SQL predicates and collects their parameters.
struct FilterScope<'a> {
    registry: &'a MetadataRegistry,
    root: &'static EntityMeta,
    dialect: Dialect,
    params: Vec<Value>,
    next_alias: usize,
}

impl<'a> FilterScope<'a> {
    fn new(registry: &'a MetadataRegistry, root: &'static EntityMeta, dialect: Dialect) -> Self {
        Self {
            registry,
            root,
            dialect,
            params: Vec::new(),
            next_alias: 0,
        }
    }

    fn invalid(&self, filter: &Filter, message: impl Into<String>) -> Error {
        Error::Plan(PlanError::invalid_filter(
            self.root.name,
            filter.path.clone(),
            message,
        ))
    }

    fn resolve(
        &mut self,
        filter: &Filter,
        root_alias: &str,
        joins: &mut Vec<String>,
        join_aliases: &mut HashMap<String, String>,
    ) -> Result<String> {
        let segments: Vec<&str> = filter.path.split('.').map(str::trim).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(self.invalid(filter, "empty path segment"));
        }
        if filter.value.is_null() {
            return Err(self.invalid(filter, "NULL is not a valid filter parameter"));
        }
        self.predicate(filter, self.root, root_alias, &segments, joins, join_aliases)
    }

    fn predicate(
        &mut self,
        filter: &Filter,
        meta: &'static EntityMeta,
        alias: &str,
        segments: &[&str],
        joins: &mut Vec<String>,
        join_aliases: &mut HashMap<String, String>,
    ) -> Result<String> {
        let dialect = self.dialect;
        let q = |name: &str| dialect.quote_identifier(name);
        let Some((first, rest)) = segments.split_first() else {
            return Err(self.invalid(filter, "empty path"));
        };

        if rest.is_empty() {
            if let Some(column) = meta.column(first) {
                if !column.sql_type.accepts(&filter.value) {
                    return Err(self.invalid(
                        filter,
                        format!(
                            "{}.{} is {} but the parameter is {}",
                            meta.name,
                            column.field,
                            column.sql_type.sql_name(),
                            filter.value.type_name()
                        ),
                    ));
                }
                return Ok(self.compare(alias, column.column, filter));
            }
            return match meta.relationship(first) {
                Some(rel) => match rel.kind {
                    RelationshipKind::ToOne { fk_column, .. } => {
                        if !SqlType::BigInt.accepts(&filter.value) {
                            return Err(self.invalid(
                                filter,
                                format!(
                                    "{}.{} compares by key but the parameter is {}",
                                    meta.name,
                                    rel.name,
                                    filter.value.type_name()
                                ),
                            ));
                        }
                        Ok(self.compare(alias, fk_column, filter))
                    }
                    RelationshipKind::ToMany { .. } => Err(self.invalid(
                        filter,
                        format!("{}.{} is a collection; name one of its columns", meta.name, rel.name),
                    )),
                },
                None => Err(self.invalid(
                    filter,
                    format!("{} has no column or relationship '{}'", meta.name, first),
                )),
            };
        }

        let Some(rel) = meta.relationship(first) else {
            return Err(self.invalid(
                filter,
                format!("{} has no relationship '{}'", meta.name, first),
            ));
        };
        let target = self.registry.target(rel)?;
        let target_pk = q(target.primary_key().column);

        match &rel.kind {
            RelationshipKind::ToOne { fk_column, .. } => {
                let key = format!("{}.{}", alias, rel.name);
                let join_alias = if let Some(existing) = join_aliases.get(&key) {
                    existing.clone()
                } else {
                    let join_alias = format!("f{}", self.next_alias);
                    self.next_alias += 1;
                    joins.push(format!(
                        " INNER JOIN {} {} ON {}.{} = {}.{}",
                        q(target.table),
                        join_alias,
                        join_alias,
                        target_pk,
                        alias,
                        q(fk_column)
                    ));
                    join_aliases.insert(key, join_alias.clone());
                    join_alias
                };
                self.predicate(filter, target, &join_alias, rest, joins, join_aliases)
            }
            RelationshipKind::ToMany { link } => {
                let n = self.next_alias;
                self.next_alias += 1;
                let sub_alias = format!("s{}", n);
                let sub_link = format!("sl{}", n);
                let mut sub_joins = Vec::new();
                let mut sub_aliases = HashMap::new();
                let inner = self.predicate(
                    filter,
                    target,
                    &sub_alias,
                    rest,
                    &mut sub_joins,
                    &mut sub_aliases,
                )?;
                Ok(format!(
                    "{}.{} IN (SELECT {}.{} FROM {} {} INNER JOIN {} {} ON {}.{} = {}.{}{} WHERE {})",
                    alias,
                    q(meta.primary_key().column),
                    sub_link,
                    q(link.local_column),
                    q(link.table),
                    sub_link,
                    q(target.table),
                    sub_alias,
                    sub_alias,
                    target_pk,
                    sub_link,
                    q(link.remote_column),
                    sub_joins.concat(),
                    inner
                ))
            }
        }
    }

    fn compare(&mut self, alias: &str, column: &str, filter: &Filter) -> String {
        self.params.push(filter.value.clone());
        format!(
            "{}.{} = {}",
            alias,
            self.dialect.quote_identifier(column),
            self.dialect.placeholder(self.params.len())
        )
    }
}
