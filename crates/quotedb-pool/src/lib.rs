//! Connection pooling for QuoteDB.
//!
//! The pool is owned by the session factory and shared by every session it
//! opens. Checkout never waits: when all `max_connections` connections are in
//! use, [`Pool::acquire`] fails with [`PoolErrorKind::Exhausted`]. A
//! [`PooledConnection`] goes back to the pool when dropped; a connection that
//! comes back with an open transaction is rolled back on its next checkout.

use quotedb_core::{
    Connection, Cx, Dialect, Error, IsolationLevel, Outcome, PoolError, PoolErrorKind, Result,
    Row, Value,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections allowed
    pub max_connections: usize,
    /// Test connections before giving them out
    pub test_on_checkout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            test_on_checkout: false,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given max connections.
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            ..Default::default()
        }
    }

    /// Enable/disable test on checkout.
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of connections (active + idle)
    pub total_connections: usize,
    /// Number of idle connections
    pub idle_connections: usize,
    /// Number of checked-out connections
    pub active_connections: usize,
}

type ConnectFn<C> = dyn Fn() -> Result<C> + Send + Sync;

struct PoolInner<C> {
    config: PoolConfig,
    connect: Box<ConnectFn<C>>,
    idle: Mutex<Vec<C>>,
    total: AtomicUsize,
    closed: AtomicBool,
}

impl<C> PoolInner<C> {
    fn idle(&self) -> MutexGuard<'_, Vec<C>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, conn: C) {
        if self.closed.load(Ordering::Acquire) {
            self.total.fetch_sub(1, Ordering::AcqRel);
            return;
        }
        self.idle().push(conn);
    }

    fn discard(&self) {
        self.total.fetch_sub(1, Ordering::AcqRel);
    }

    /// Reserve a slot for a new connection, if under the limit.
    fn reserve(&self) -> bool {
        self.total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.config.max_connections).then_some(n + 1)
            })
            .is_ok()
    }
}

/// A bounded, non-waiting connection pool.
pub struct Pool<C: Connection> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connection> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connection> Pool<C> {
    /// Create a pool that opens connections with `connect`.
    ///
    /// No connection is opened until the first checkout.
    pub fn new(config: PoolConfig, connect: impl Fn() -> Result<C> + Send + Sync + 'static) -> Result<Self> {
        if config.max_connections == 0 {
            return Err(Error::Pool(PoolError {
                kind: PoolErrorKind::Config,
                message: "max_connections must be at least 1".to_string(),
            }));
        }
        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                connect: Box::new(connect),
                idle: Mutex::new(Vec::new()),
                total: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let total = self.inner.total.load(Ordering::Acquire);
        let idle = self.inner.idle().len();
        PoolStats {
            total_connections: total,
            idle_connections: idle,
            active_connections: total.saturating_sub(idle),
        }
    }

    /// Check if the pool is at capacity.
    pub fn at_capacity(&self) -> bool {
        self.inner.total.load(Ordering::Acquire) >= self.inner.config.max_connections
    }

    /// Check out a connection.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn acquire(&self, cx: &Cx) -> Outcome<PooledConnection<C>, Error> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Outcome::Err(pool_error(PoolErrorKind::Closed, "pool is closed"));
        }

        loop {
            let candidate = self.inner.idle().pop();
            let Some(conn) = candidate else {
                break;
            };
            if conn.in_transaction() {
                tracing::debug!("Rolling back transaction left open on a returned connection");
                match conn.rollback(cx).await {
                    Outcome::Ok(()) => {}
                    Outcome::Err(e) => {
                        tracing::warn!(error = %e, "Discarding connection that failed to roll back");
                        self.inner.discard();
                        continue;
                    }
                    Outcome::Cancelled(r) => {
                        self.inner.release(conn);
                        return Outcome::Cancelled(r);
                    }
                    Outcome::Panicked(p) => {
                        self.inner.discard();
                        return Outcome::Panicked(p);
                    }
                }
            }
            if self.inner.config.test_on_checkout {
                if let Outcome::Err(e) = conn.ping(cx).await {
                    tracing::warn!(error = %e, "Discarding connection that failed its ping");
                    self.inner.discard();
                    continue;
                }
            }
            tracing::trace!("Reusing idle connection");
            return Outcome::Ok(self.wrap(conn));
        }

        if !self.inner.reserve() {
            return Outcome::Err(pool_error(
                PoolErrorKind::Exhausted,
                format!(
                    "all {} connections are in use",
                    self.inner.config.max_connections
                ),
            ));
        }
        match (self.inner.connect)() {
            Ok(conn) => {
                tracing::debug!(
                    total = self.inner.total.load(Ordering::Acquire),
                    "Opened pooled connection"
                );
                Outcome::Ok(self.wrap(conn))
            }
            Err(e) => {
                self.inner.discard();
                Outcome::Err(e)
            }
        }
    }

    /// Close the pool: idle connections are dropped now, checked-out ones on return.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let drained: Vec<C> = self.inner.idle().drain(..).collect();
        self.inner.total.fetch_sub(drained.len(), Ordering::AcqRel);
        tracing::debug!(dropped = drained.len(), "Pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn wrap(&self, conn: C) -> PooledConnection<C> {
        PooledConnection {
            conn: Some(conn),
            pool: Arc::downgrade(&self.inner),
        }
    }
}

impl<C: Connection> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn pool_error(kind: PoolErrorKind, message: impl Into<String>) -> Error {
    Error::Pool(PoolError {
        kind,
        message: message.into(),
    })
}

/// A connection borrowed from the pool; returned on drop.
pub struct PooledConnection<C> {
    conn: Option<C>,
    pool: Weak<PoolInner<C>>,
}

impl<C> PooledConnection<C> {
    fn conn(&self) -> &C {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection is only taken on drop"),
        }
    }
}

impl<C> std::ops::Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        self.conn()
    }
}

impl<C> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if let Some(pool) = self.pool.upgrade() {
            pool.release(conn);
            tracing::trace!("Connection returned to pool");
        }
    }
}

impl<C> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("attached", &(self.pool.strong_count() > 0))
            .finish_non_exhaustive()
    }
}

impl<C: Connection> Connection for PooledConnection<C> {
    fn dialect(&self) -> Dialect {
        self.conn().dialect()
    }

    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.conn().query(cx, sql, params)
    }

    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        self.conn().query_one(cx, sql, params)
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.conn().execute(cx, sql, params)
    }

    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        self.conn().insert(cx, sql, params)
    }

    fn batch(
        &self,
        cx: &Cx,
        statements: &[(String, Vec<Value>)],
    ) -> impl Future<Output = Outcome<Vec<u64>, Error>> + Send {
        self.conn().batch(cx, statements)
    }

    fn begin(
        &self,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.conn().begin(cx, isolation)
    }

    fn commit(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.conn().commit(cx)
    }

    fn rollback(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.conn().rollback(cx)
    }

    fn in_transaction(&self) -> bool {
        self.conn().in_transaction()
    }

    fn ping(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.conn().ping(cx)
    }
}
