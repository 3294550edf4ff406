//! Structured queries.
//!
//! A query names its root entity, a list of equality filters combined by AND,
//! an optional ordering on root columns, and a [`LoadPlan`]. Filter paths are
//! dotted: `"name"`, `"attributedTo.name"`, `"subjects.subject"`.

use crate::load_plan::LoadPlan;
use quotedb_core::{Entity, EntityMeta, Value};
use std::marker::PhantomData;

/// `path = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub path: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Ordering on a basic column of the root entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// The untyped description the planner works on.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub root: &'static EntityMeta,
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    pub plan: LoadPlan,
}

impl QuerySpec {
    pub fn new(root: &'static EntityMeta) -> Self {
        Self {
            root,
            filters: Vec::new(),
            order: Vec::new(),
            plan: LoadPlan::new(),
        }
    }
}

/// A query whose roots are instances of `E`.
///
/// # Example
///
/// ```ignore
/// let query = Query::<Quote>::new()
///     .filter("attributedTo.name", "Ron Paul")
///     .order_by("id")
///     .load(LoadPlan::new().subgraph("attributedTo").element_subgraph("subjects"));
/// let quotes = session.query(&cx, &query).await;
/// ```
#[derive(Debug, Clone)]
pub struct Query<E: Entity> {
    spec: QuerySpec,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Query<E> {
    pub fn new() -> Self {
        Self {
            spec: QuerySpec::new(E::META),
            _marker: PhantomData,
        }
    }

    /// The single row with primary key `id`.
    pub fn by_id(id: i64) -> Self {
        let pk = E::META.primary_key().field;
        Self::new().filter(pk, id)
    }

    /// Add an equality filter.
    #[must_use]
    pub fn filter(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.spec.filters.push(Filter::eq(path, value));
        self
    }

    /// Order by a root column, ascending.
    #[must_use]
    pub fn order_by(self, field: impl Into<String>) -> Self {
        self.order(field, Direction::Asc)
    }

    /// Order by a root column, descending.
    #[must_use]
    pub fn order_by_desc(self, field: impl Into<String>) -> Self {
        self.order(field, Direction::Desc)
    }

    fn order(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.spec.order.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Replace the load plan.
    #[must_use]
    pub fn load(mut self, plan: LoadPlan) -> Self {
        self.spec.plan = plan;
        self
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn into_spec(self) -> QuerySpec {
        self.spec
    }
}

impl<E: Entity> Default for Query<E> {
    fn default() -> Self {
        Self::new()
    }
}
