//! Object-graph assembly from a planned result set.
//!
//! Walks the rows of a [`PlannedQuery`] and, for every [`NodePlan`] position,
//! looks the row's key up in the session identity map or hydrates a new
//! instance. Targets are attached to their parents idempotently, so the
//! cartesian rows of a to-many join collapse into one collection per parent.

use crate::identity_map::{EntityKey, IdentityMap};
use quotedb_core::{ErasedRef, MetadataRegistry, Result, Row, same_instance};
use quotedb_query::{NodePlan, PlannedQuery};
use std::collections::HashSet;

/// Assemble `rows` into de-duplicated roots, in first-appearance order.
pub fn assemble(
    registry: &MetadataRegistry,
    identity: &mut IdentityMap,
    planned: &PlannedQuery,
    rows: &[Row],
) -> Result<Vec<ErasedRef>> {
    let mut roots: Vec<ErasedRef> = Vec::new();
    let mut seen_roots = HashSet::new();
    let mut marked = HashSet::new();

    for row in rows {
        let Some(root) = resolve(registry, identity, &planned.root, row)? else {
            continue;
        };
        if let Some(key) = EntityKey::of(&root) {
            if seen_roots.insert(key) {
                roots.push(root.clone());
            }
        }
        attach_children(registry, identity, &planned.root, &root, row, &mut marked)?;
    }

    tracing::debug!(
        rows = rows.len(),
        roots = roots.len(),
        managed = identity.len(),
        "Assembled result set"
    );
    Ok(roots)
}

/// Resolve the instance at `node` in `row`; `None` when its key is NULL.
pub fn resolve(
    registry: &MetadataRegistry,
    identity: &mut IdentityMap,
    node: &NodePlan,
    row: &Row,
) -> Result<Option<ErasedRef>> {
    let prefix = node.prefix();
    let pk_column = format!("{}{}", prefix, node.entity.primary_key().column);
    let Some(id) = row.get_by_name(&pk_column).and_then(|v| v.as_i64()) else {
        return Ok(None);
    };
    let key = EntityKey::new(node.entity.name, id);
    if let Some(existing) = identity.get(&key) {
        return Ok(Some(existing.clone()));
    }
    let hydrate = registry.entity(node.entity.name)?.hydrate;
    let fresh = hydrate(&row.subset_by_prefix(&prefix))?;
    Ok(Some(identity.put_if_absent(key, fresh)))
}

fn attach_children(
    registry: &MetadataRegistry,
    identity: &mut IdentityMap,
    node: &NodePlan,
    parent: &ErasedRef,
    row: &Row,
    marked: &mut HashSet<(EntityKey, &'static str)>,
) -> Result<()> {
    for child in &node.children {
        let Some(rel) = child.relationship else {
            continue;
        };
        let target = resolve(registry, identity, child, row)?;

        if rel.is_to_many() {
            // First sighting of this parent materializes its collection so
            // parents without link rows end up with an empty set.
            let first_sighting = EntityKey::of(parent)
                .is_none_or(|key| marked.insert((key, rel.name)));
            if first_sighting {
                parent.mark_loaded(rel.name);
            }
            if let Some(target) = &target {
                parent.attach(rel.name, target.clone())?;
            }
        } else {
            match &target {
                Some(target) => parent.attach(rel.name, target.clone())?,
                None => parent.mark_loaded(rel.name),
            }
        }

        if let Some(target) = target {
            attach_children(registry, identity, child, &target, row, marked)?;
        }
    }
    Ok(())
}

/// Attach each row's root to `owner.relationship` and mark it loaded.
pub fn attach_loaded(
    registry: &MetadataRegistry,
    identity: &mut IdentityMap,
    planned: &PlannedQuery,
    owner: &ErasedRef,
    relationship: &str,
    rows: &[Row],
) -> Result<usize> {
    let mut attached = 0;
    for row in rows {
        if let Some(target) = resolve(registry, identity, &planned.root, row)? {
            let already = owner
                .targets(relationship)
                .iter()
                .any(|t| same_instance(t, &target));
            owner.attach(relationship, target)?;
            if !already {
                attached += 1;
            }
        }
    }
    owner.mark_loaded(relationship);
    Ok(attached)
}
