//! Sessions for QuoteDB.
//!
//! `quotedb-session` is the **unit-of-work layer**. A [`Session`] owns one
//! connection and coordinates object identity, staged writes and graph
//! assembly on top of it.
//!
//! # Role In The Architecture
//!
//! - **Identity map**: a single in-memory instance per `(entity, id)`.
//! - **Unit of work**: inserts, updates and deletes staged until flush.
//! - **Assembly**: planned result sets become de-duplicated object graphs.
//! - **Transactional safety**: flush, commit and rollback around a `Connection`.
//!
//! # Lifecycle
//!
//! A session starts *open* without a transaction. [`Session::begin`] makes it
//! active; every persistence call requires an active transaction.
//! [`Session::commit`] flushes then commits; [`Session::rollback`] discards all
//! session state. [`Session::close`] is idempotent and gives the connection
//! back; instances read through the session become detached.
//!
//! # Example
//!
//! ```ignore
//! let mut session = Session::new(conn, registry);
//! session.begin(&cx).await;
//!
//! let ron = Author::new("Ron Paul").into_ref();
//! session.persist(&ron)?;
//!
//! let plan = LoadPlan::new().subgraph("attributedTo").element_subgraph("subjects");
//! let quotes = session.query(&cx, &Query::<Quote>::new().load(plan)).await;
//!
//! session.commit(&cx).await;
//! session.close(&cx).await;
//! ```

pub mod assemble;
pub mod flush;
pub mod identity_map;
pub mod unit_of_work;

#[cfg(test)]
mod test_support;

pub use flush::FlushResult;
pub use identity_map::{EntityKey, IdentityMap};
pub use unit_of_work::{PendingOp, UnitOfWork};

use quotedb_core::{
    Connection, Cx, Entity, EntityRef, Error, IsolationLevel, MetadataRegistry, Outcome,
    PlanError, Result, Row, SessionErrorKind, Value, downcast, erase, try_outcome, try_result,
};
use quotedb_query::{LoadPlan, Query, plan, plan_relationship_load};
use std::fmt;
use std::sync::Arc;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Open, no transaction.
    Open,
    InTransaction,
    Closed,
}

/// A scoped transactional handle over one connection.
pub struct Session<C: Connection> {
    connection: Option<C>,
    registry: Arc<MetadataRegistry>,
    identity: IdentityMap,
    uow: UnitOfWork,
    state: SessionState,
    /// Set when a flush fails; only rollback and close are allowed afterwards.
    unusable: bool,
}

impl<C: Connection> Session<C> {
    pub fn new(connection: C, registry: Arc<MetadataRegistry>) -> Self {
        Self {
            connection: Some(connection),
            registry,
            identity: IdentityMap::new(),
            uow: UnitOfWork::new(),
            state: SessionState::Open,
            unusable: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn in_transaction(&self) -> bool {
        self.state == SessionState::InTransaction
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    /// Number of instances in the identity map.
    pub fn managed_count(&self) -> usize {
        self.identity.len()
    }

    /// Number of staged operations not yet flushed.
    pub fn pending_count(&self) -> usize {
        self.uow.len()
    }

    /// The underlying connection.
    pub fn connection(&self) -> Result<&C> {
        self.connection.as_ref().ok_or_else(closed_error)
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            SessionState::Closed => Err(closed_error()),
            SessionState::Open => Err(Error::session(
                SessionErrorKind::NotInTransaction,
                "no active transaction; call begin first",
            )),
            SessionState::InTransaction if self.unusable => Err(Error::session(
                SessionErrorKind::Unusable,
                "a previous flush failed; roll back or close the session",
            )),
            SessionState::InTransaction => Ok(()),
        }
    }

    // ========================================================================
    // Transaction Management
    // ========================================================================

    /// Begin a transaction.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn begin(&mut self, cx: &Cx) -> Outcome<(), Error> {
        match self.state {
            SessionState::Closed => return Outcome::Err(closed_error()),
            SessionState::InTransaction => {
                return Outcome::Err(Error::session(
                    SessionErrorKind::AlreadyInTransaction,
                    "a transaction is already active",
                ));
            }
            SessionState::Open => {}
        }
        let conn = try_result!(self.connection());
        match conn.begin(cx, IsolationLevel::ReadCommitted).await {
            Outcome::Ok(()) => {
                self.state = SessionState::InTransaction;
                tracing::debug!("Transaction started");
                Outcome::Ok(())
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Flush pending changes, then commit.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn commit(&mut self, cx: &Cx) -> Outcome<(), Error> {
        try_result!(self.ensure_active());
        try_outcome!(self.flush(cx).await);

        let conn = try_result!(self.connection());
        match conn.commit(cx).await {
            Outcome::Ok(()) => {
                self.state = SessionState::Open;
                self.uow.commit_inserted();
                tracing::debug!(managed = self.identity.len(), "Transaction committed");
                Outcome::Ok(())
            }
            Outcome::Err(e) => {
                self.unusable = true;
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Roll back the transaction and discard the session state.
    ///
    /// Allowed after a failed flush. Managed instances become detached.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn rollback(&mut self, cx: &Cx) -> Outcome<(), Error> {
        match self.state {
            SessionState::Closed => return Outcome::Err(closed_error()),
            SessionState::Open => {
                return Outcome::Err(Error::session(
                    SessionErrorKind::NotInTransaction,
                    "no active transaction to roll back",
                ));
            }
            SessionState::InTransaction => {}
        }
        self.discard();
        self.state = SessionState::Open;

        let conn = try_result!(self.connection());
        let outcome = conn.rollback(cx).await;
        tracing::debug!("Transaction rolled back");
        outcome
    }

    /// Close the session, rolling back an active transaction.
    ///
    /// Idempotent. The connection is released even when the rollback fails.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn close(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if self.state == SessionState::Closed {
            return Outcome::Ok(());
        }
        let mut outcome = Outcome::Ok(());
        if self.state == SessionState::InTransaction {
            if let Some(conn) = self.connection.as_ref() {
                outcome = conn.rollback(cx).await;
            }
        }
        self.discard();
        self.state = SessionState::Closed;
        self.connection = None;
        tracing::debug!("Session closed");
        outcome
    }

    fn discard(&mut self) {
        if !self.uow.is_empty() {
            tracing::debug!(pending = self.uow.len(), "Discarding staged operations");
        }
        let reverted = self.uow.revert_inserted();
        if reverted > 0 {
            tracing::debug!(reverted, "Cleared keys generated by the rolled-back transaction");
        }
        self.uow.clear();
        self.identity.remove_all();
        self.unusable = false;
    }

    // ========================================================================
    // Staging
    // ========================================================================

    /// Stage the INSERT of a transient instance.
    pub fn persist<E: Entity>(&mut self, entity: &EntityRef<E>) -> Result<()> {
        self.ensure_active()?;
        let object = erase(entity);
        if object.id().is_some()
            || self.identity.contains_instance(&object)
            || self.uow.is_staged_insert(&object)
        {
            return Err(Error::session(
                SessionErrorKind::NotTransient,
                format!("{} is not transient", E::META.name),
            ));
        }
        tracing::trace!(entity = E::META.name, "Staged insert");
        self.uow.stage_insert(object);
        Ok(())
    }

    /// Stage an UPDATE of a managed instance after its fields were changed.
    pub fn update<E: Entity>(&mut self, entity: &EntityRef<E>) -> Result<()> {
        self.ensure_active()?;
        let object = erase(entity);
        if self.uow.is_staged_insert(&object) {
            return Ok(());
        }
        if !self.identity.contains_instance(&object) {
            return Err(not_managed(E::META.name));
        }
        self.uow.stage_update(object);
        Ok(())
    }

    /// Stage the DELETE of a managed instance, or unstage a pending insert.
    pub fn remove<E: Entity>(&mut self, entity: &EntityRef<E>) -> Result<()> {
        self.ensure_active()?;
        let object = erase(entity);
        if !self.uow.is_staged_insert(&object) && !self.identity.contains_instance(&object) {
            return Err(not_managed(E::META.name));
        }
        self.uow.stage_delete(object);
        Ok(())
    }

    /// Whether `entity` is the managed instance for its key.
    pub fn contains<E: Entity>(&self, entity: &EntityRef<E>) -> bool {
        self.identity.contains_instance(&erase(entity))
    }

    /// Write out staged operations.
    ///
    /// A failed flush leaves the session unusable until rollback or close.
    pub async fn flush(&mut self, cx: &Cx) -> Outcome<FlushResult, Error> {
        try_result!(self.ensure_active());
        if self.uow.is_empty() {
            return Outcome::Ok(FlushResult::default());
        }
        let ops = self.uow.take();
        let Some(conn) = self.connection.as_ref() else {
            return Outcome::Err(closed_error());
        };
        let mut inserted = Vec::new();
        let outcome = flush::execute(
            cx,
            conn,
            &self.registry,
            ops,
            &mut self.identity,
            &mut inserted,
        )
        .await;
        self.uow.record_inserted(inserted);
        if !matches!(outcome, Outcome::Ok(_)) {
            tracing::warn!("Flush failed; session is unusable until rollback");
            self.unusable = true;
        }
        outcome
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Find an instance by primary key.
    ///
    /// Without a load plan a managed instance is returned without SQL.
    pub async fn find<E: Entity>(
        &mut self,
        cx: &Cx,
        id: i64,
        load: Option<&LoadPlan>,
    ) -> Outcome<Option<EntityRef<E>>, Error> {
        try_result!(self.ensure_active());
        if load.is_none_or(LoadPlan::is_empty) {
            if let Some(cached) = self.identity.get_typed::<E>(id) {
                tracing::trace!(entity = E::META.name, id, "Identity map hit");
                return Outcome::Ok(Some(cached));
            }
        }
        let mut query = Query::<E>::by_id(id);
        if let Some(load) = load {
            query = query.load(load.clone());
        }
        let found = try_outcome!(self.query(cx, &query).await);
        Outcome::Ok(found.into_iter().next())
    }

    /// Run a structured query as one SQL statement and assemble its roots.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = E::META.name))]
    pub async fn query<E: Entity>(
        &mut self,
        cx: &Cx,
        query: &Query<E>,
    ) -> Outcome<Vec<EntityRef<E>>, Error> {
        try_result!(self.ensure_active());
        try_outcome!(self.flush(cx).await);

        let Some(conn) = self.connection.as_ref() else {
            return Outcome::Err(closed_error());
        };
        let planned = try_result!(plan(&self.registry, query.spec(), conn.dialect()));
        let rows = try_outcome!(conn.query(cx, &planned.sql, &planned.params).await);
        let roots = try_result!(assemble::assemble(
            &self.registry,
            &mut self.identity,
            &planned,
            &rows
        ));
        let typed = try_result!(
            roots
                .iter()
                .map(|root| {
                    downcast::<E>(root).ok_or_else(|| {
                        Error::Custom(format!("assembled root is not a {}", E::META.name))
                    })
                })
                .collect::<Result<Vec<_>>>()
        );
        tracing::debug!(rows = rows.len(), results = typed.len(), "Query complete");
        Outcome::Ok(typed)
    }

    /// Run raw SQL inside the session's transaction, after an automatic flush.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn native_query(
        &mut self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> Outcome<Vec<Row>, Error> {
        try_result!(self.ensure_active());
        try_outcome!(self.flush(cx).await);
        let conn = try_result!(self.connection());
        tracing::trace!(sql = %sql, "Native query");
        conn.query(cx, sql, params).await
    }

    /// Hand the raw connection to `f` within the active transaction.
    pub fn with_connection<R>(&self, f: impl FnOnce(&C) -> R) -> Result<R> {
        self.ensure_active()?;
        Ok(f(self.connection()?))
    }

    /// Load one relationship of a managed instance with a single statement.
    ///
    /// Returns how many targets were attached; an already loaded relationship
    /// issues no SQL.
    #[tracing::instrument(level = "debug", skip(self, cx, instance), fields(entity = E::META.name))]
    pub async fn initialize<E: Entity>(
        &mut self,
        cx: &Cx,
        instance: &EntityRef<E>,
        relationship: &str,
    ) -> Outcome<usize, Error> {
        try_result!(self.ensure_active());
        let Some(rel) = E::META.relationship(relationship) else {
            return Outcome::Err(Error::Plan(PlanError::invalid_load_plan(
                E::META.name,
                relationship,
                format!("{} has no relationship '{}'", E::META.name, relationship),
            )));
        };
        let owner = erase(instance);
        if owner.is_loaded(relationship) {
            return Outcome::Ok(0);
        }
        if !self.identity.contains_instance(&owner) {
            return Outcome::Err(not_managed(E::META.name));
        }
        let key = if rel.is_to_many() {
            owner.id()
        } else {
            owner.foreign_id(relationship)
        };
        let Some(key) = key else {
            owner.mark_loaded(relationship);
            return Outcome::Ok(0);
        };

        try_outcome!(self.flush(cx).await);
        let Some(conn) = self.connection.as_ref() else {
            return Outcome::Err(closed_error());
        };
        let planned = try_result!(plan_relationship_load(
            &self.registry,
            E::META,
            relationship,
            key,
            conn.dialect()
        ));
        let rows = try_outcome!(conn.query(cx, &planned.sql, &planned.params).await);
        let attached = try_result!(assemble::attach_loaded(
            &self.registry,
            &mut self.identity,
            &planned,
            &owner,
            relationship,
            &rows
        ));
        Outcome::Ok(attached)
    }
}

impl<C: Connection> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("unusable", &self.unusable)
            .field("identity", &self.identity)
            .field("pending", &self.uow.len())
            .finish_non_exhaustive()
    }
}

fn closed_error() -> Error {
    Error::session(SessionErrorKind::Closed, "session is closed")
}

fn not_managed(entity: &str) -> Error {
    Error::session(
        SessionErrorKind::NotManaged,
        format!("{entity} is not managed by this session"),
    )
}
