//! Load plans.
//!
//! A [`LoadPlan`] is a tree of relationship names rooted at the queried entity.
//! Every node is materialized by the same SQL statement as the root. Interior
//! nodes are *subgraphs* (to-one) or *element subgraphs* (to-many); nodes added
//! by dotted path carry [`NodeKind::Auto`] and accept either.

use quotedb_core::{EntityMeta, Error, MetadataRegistry, PlanError, Result};

/// Declared shape of a load-plan node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    /// Either shape; resolved from metadata.
    #[default]
    Auto,
    /// A to-one relationship.
    Subgraph,
    /// A to-many relationship.
    ElementSubgraph,
}

/// One relationship to materialize, with its nested relationships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    pub relationship: String,
    pub kind: NodeKind,
    pub nested: Vec<PlanNode>,
}

impl PlanNode {
    #[must_use]
    pub fn new(relationship: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            relationship: relationship.into(),
            kind,
            nested: Vec::new(),
        }
    }

    /// A to-one node.
    #[must_use]
    pub fn subgraph(relationship: impl Into<String>) -> Self {
        Self::new(relationship, NodeKind::Subgraph)
    }

    /// A to-many node.
    #[must_use]
    pub fn element_subgraph(relationship: impl Into<String>) -> Self {
        Self::new(relationship, NodeKind::ElementSubgraph)
    }

    /// Add a nested node.
    #[must_use]
    pub fn nest(mut self, node: PlanNode) -> Self {
        merge_into(&mut self.nested, node);
        self
    }

    fn validate(&self, parent: &'static EntityMeta, registry: &MetadataRegistry, prefix: &str) -> Result<()> {
        let path = if prefix.is_empty() {
            self.relationship.clone()
        } else {
            format!("{}.{}", prefix, self.relationship)
        };
        let Some(rel) = parent.relationship(&self.relationship) else {
            return Err(Error::Plan(PlanError::invalid_load_plan(
                parent.name,
                path,
                format!("{} has no relationship '{}'", parent.name, self.relationship),
            )));
        };
        match (self.kind, rel.is_to_many()) {
            (NodeKind::Subgraph, true) => {
                return Err(Error::Plan(PlanError::invalid_load_plan(
                    parent.name,
                    path,
                    "to-many relationship declared as a subgraph; use an element subgraph",
                )));
            }
            (NodeKind::ElementSubgraph, false) => {
                return Err(Error::Plan(PlanError::invalid_load_plan(
                    parent.name,
                    path,
                    "to-one relationship declared as an element subgraph; use a subgraph",
                )));
            }
            _ => {}
        }
        let target = registry.target(rel)?;
        for child in &self.nested {
            child.validate(target, registry, &path)?;
        }
        Ok(())
    }
}

/// A tree of relationships to materialize together with the query root.
///
/// # Example
///
/// ```ignore
/// let plan = LoadPlan::new()
///     .subgraph("attributedTo")
///     .element_subgraph("subjects");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadPlan {
    nodes: Vec<PlanNode>,
}

impl LoadPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize a to-one relationship of the root.
    #[must_use]
    pub fn subgraph(self, relationship: impl Into<String>) -> Self {
        self.node(PlanNode::subgraph(relationship))
    }

    /// Materialize a to-many relationship of the root.
    #[must_use]
    pub fn element_subgraph(self, relationship: impl Into<String>) -> Self {
        self.node(PlanNode::element_subgraph(relationship))
    }

    /// Add a prepared node, merging with an existing node of the same name.
    #[must_use]
    pub fn node(mut self, node: PlanNode) -> Self {
        merge_into(&mut self.nodes, node);
        self
    }

    /// Materialize a dotted path such as `"attributedTo.books"`.
    ///
    /// Empty segments are ignored; an empty path leaves the plan unchanged.
    #[must_use]
    pub fn include(self, path: &str) -> Self {
        let parts: Vec<&str> = path
            .trim()
            .split('.')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        match build_nested(&parts) {
            Some(node) => self.node(node),
            None => self,
        }
    }

    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the root-level relationship `name` is planned.
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n.relationship == name)
    }

    /// Check every named relationship against the metadata of `root`.
    pub fn validate(&self, root: &'static EntityMeta, registry: &MetadataRegistry) -> Result<()> {
        for node in &self.nodes {
            node.validate(root, registry, "")?;
        }
        Ok(())
    }
}

fn build_nested(parts: &[&str]) -> Option<PlanNode> {
    let (first, rest) = parts.split_first()?;
    let mut node = PlanNode::new(*first, NodeKind::Auto);
    if let Some(child) = build_nested(rest) {
        node.nested.push(child);
    }
    Some(node)
}

fn merge_into(nodes: &mut Vec<PlanNode>, node: PlanNode) {
    if let Some(existing) = nodes
        .iter_mut()
        .find(|n| n.relationship == node.relationship)
    {
        if existing.kind == NodeKind::Auto {
            existing.kind = node.kind;
        }
        for child in node.nested {
            merge_into(&mut existing.nested, child);
        }
    } else {
        nodes.push(node);
    }
}
