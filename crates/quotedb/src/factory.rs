//! Session factory: metadata, connection pool and transaction scoping.

use crate::config::{CacheMode, FactoryConfig};
use crate::entity::{Author, Quote, Subject};
use quotedb_core::{
    Cx, Error, MetadataRegistry, Outcome, RecordingConnection, Result, StatementLog, try_outcome,
    try_result,
};
use quotedb_pool::{Pool, PoolConfig, PoolStats, PooledConnection};
use quotedb_session::Session;
use quotedb_sqlite::SqliteConnection;
use std::sync::Arc;

/// The connection type every factory session runs on.
pub type FactoryConnection = RecordingConnection<SqliteConnection>;

/// A session checked out from a [`SessionFactory`].
pub type QuoteSession = Session<PooledConnection<FactoryConnection>>;

/// Metadata for the catalog entities.
pub fn catalog_registry() -> Result<Arc<MetadataRegistry>> {
    MetadataRegistry::builder()
        .register::<Quote>()
        .register::<Subject>()
        .register::<Author>()
        .build()
}

/// Creates sessions over a shared pool of SQLite connections.
///
/// `Send + Sync`; share it behind an `Arc` or by reference.
#[derive(Debug)]
pub struct SessionFactory {
    registry: Arc<MetadataRegistry>,
    pool: Pool<FactoryConnection>,
    config: FactoryConfig,
}

impl SessionFactory {
    /// Validate `config`, open the first connection and apply the schema action.
    pub async fn open(cx: &Cx, config: FactoryConfig) -> Outcome<Self, Error> {
        Self::build(cx, config, None).await
    }

    /// Like [`open`](Self::open), appending every statement to `log`.
    pub async fn open_recording(
        cx: &Cx,
        config: FactoryConfig,
        log: StatementLog,
    ) -> Outcome<Self, Error> {
        Self::build(cx, config, Some(log)).await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(url = %config.url))]
    async fn build(
        cx: &Cx,
        config: FactoryConfig,
        log: Option<StatementLog>,
    ) -> Outcome<Self, Error> {
        let sqlite = try_result!(config.sqlite_config());
        let max_connections = try_result!(config.effective_max_connections());
        let registry = try_result!(catalog_registry());
        if config.cache_mode == CacheMode::Selective {
            tracing::debug!("Cache mode 'selective' requested; only session-local identity is kept");
        }

        let echo = config.echo_sql;
        let pool = try_result!(Pool::new(PoolConfig::new(max_connections), move || {
            let conn = RecordingConnection::new(SqliteConnection::open(&sqlite)?).echo(echo);
            Ok(match &log {
                Some(log) => conn.with_log(log.clone()),
                None => conn,
            })
        }));

        {
            let conn = try_outcome!(pool.acquire(cx).await);
            try_outcome!(quotedb_schema::apply(cx, &*conn, &registry, config.schema_action).await);
        }

        tracing::info!(
            url = %config.url,
            schema_action = %config.schema_action,
            max_connections,
            "Session factory ready"
        );
        Outcome::Ok(Self {
            registry,
            pool,
            config,
        })
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Check out a connection and wrap it in a new session.
    ///
    /// Fails with `PoolError::Exhausted` when every connection is in use.
    pub async fn open_session(&self, cx: &Cx) -> Outcome<QuoteSession, Error> {
        let conn = try_outcome!(self.pool.acquire(cx).await);
        Outcome::Ok(Session::new(conn, Arc::clone(&self.registry)))
    }

    /// Run `f` in a fresh session inside one transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise, and closes the
    /// session on every path. The original failure is returned.
    pub async fn call_in_transaction<T, F>(&self, cx: &Cx, f: F) -> Outcome<T, Error>
    where
        F: AsyncFnOnce(&mut QuoteSession) -> Outcome<T, Error>,
    {
        let mut session = try_outcome!(self.open_session(cx).await);
        let outcome = match session.begin(cx).await {
            Outcome::Ok(()) => match f(&mut session).await {
                Outcome::Ok(value) => match session.commit(cx).await {
                    Outcome::Ok(()) => Outcome::Ok(value),
                    Outcome::Err(e) => Outcome::Err(e),
                    Outcome::Cancelled(r) => Outcome::Cancelled(r),
                    Outcome::Panicked(p) => Outcome::Panicked(p),
                },
                failed => failed,
            },
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        };

        if !matches!(outcome, Outcome::Ok(_)) && session.in_transaction() {
            if let Outcome::Err(e) = session.rollback(cx).await {
                tracing::warn!(error = %e, "Rollback after failed transaction failed");
            }
        }
        if let Outcome::Err(e) = session.close(cx).await {
            tracing::warn!(error = %e, "Closing session failed");
        }
        outcome
    }

    /// Close the pool; checked-out connections are dropped when returned.
    pub fn close(&self) {
        self.pool.close();
    }
}
