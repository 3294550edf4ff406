//! Fetch planning for QuoteDB.
//!
//! `quotedb-query` turns a structured [`Query`] plus a [`LoadPlan`] into one
//! SQL statement. It does not execute anything; the session runs the
//! [`PlannedQuery`] through the `Connection` and assembles the object graph
//! by walking the [`NodePlan`] tree.
//!
//! - [`LoadPlan`]: which relationships to materialize together with the root
//! - [`Query`] / [`QuerySpec`]: root entity, AND-ed equality filters, ordering
//! - [`plan`]: SELECT with aliased columns and LEFT OUTER JOINs per planned
//!   relationship; to-one filters become INNER JOINs, to-many filters become
//!   `IN` sub-selects over the link table

pub mod filter;
pub mod load_plan;
pub mod planner;

pub use filter::{Direction, Filter, OrderBy, Query, QuerySpec};
pub use load_plan::{LoadPlan, NodeKind, PlanNode};
pub use planner::{NodePlan, PlannedQuery, plan, plan_relationship_load};

#[cfg(test)]
mod test_support;
