//! Statement recording and SQL echo.
//!
//! [`RecordingConnection`] wraps any [`Connection`] and, depending on how it is
//! built, echoes each statement through `tracing` (target `quotedb::sql`) and
//! appends it to a shared [`StatementLog`]. Tests use the log to count the
//! statements a query issues.

use crate::connection::{Connection, Dialect, IsolationLevel};
use crate::row::Row;
use crate::value::Value;
use crate::{Cx, Error, Outcome};
use std::sync::{Arc, Mutex};

/// Shared, append-only list of executed SQL statements.
#[derive(Debug, Clone, Default)]
pub struct StatementLog {
    statements: Arc<Mutex<Vec<String>>>,
}

impl StatementLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, sql: &str) {
        self.statements
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sql.to_string());
    }

    /// Snapshot of the recorded statements.
    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.statements.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of recorded SELECT statements.
    pub fn select_count(&self) -> usize {
        self.count_prefix("SELECT")
    }

    /// Number of recorded INSERT statements.
    pub fn insert_count(&self) -> usize {
        self.count_prefix("INSERT")
    }

    fn count_prefix(&self, keyword: &str) -> usize {
        self.statements
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|sql| {
                sql.trim_start()
                    .get(..keyword.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
            })
            .count()
    }

    pub fn clear(&self) {
        self.statements
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// A connection wrapper that echoes and/or records every statement.
#[derive(Debug)]
pub struct RecordingConnection<C> {
    inner: C,
    echo: bool,
    log: Option<StatementLog>,
}

impl<C: Connection> RecordingConnection<C> {
    /// Wrap `inner` without echo or recording.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            echo: false,
            log: None,
        }
    }

    /// Emit every statement at `info` level under the `quotedb::sql` target.
    #[must_use]
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Append every statement to `log`.
    #[must_use]
    pub fn with_log(mut self, log: StatementLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn log(&self) -> Option<&StatementLog> {
        self.log.as_ref()
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    fn record(&self, sql: &str, params: &[Value]) {
        if self.echo {
            tracing::info!(target: "quotedb::sql", params = params.len(), "{}", sql);
        }
        if let Some(log) = &self.log {
            log.push(sql);
        }
    }
}

impl<C: Connection> Connection for RecordingConnection<C> {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.record(sql, params);
        self.inner.query(cx, sql, params)
    }

    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        self.record(sql, params);
        self.inner.query_one(cx, sql, params)
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.record(sql, params);
        self.inner.execute(cx, sql, params)
    }

    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        self.record(sql, params);
        self.inner.insert(cx, sql, params)
    }

    fn batch(
        &self,
        cx: &Cx,
        statements: &[(String, Vec<Value>)],
    ) -> impl Future<Output = Outcome<Vec<u64>, Error>> + Send {
        for (sql, params) in statements {
            self.record(sql, params);
        }
        self.inner.batch(cx, statements)
    }

    fn begin(
        &self,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.record("BEGIN", &[]);
        self.inner.begin(cx, isolation)
    }

    fn commit(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.record("COMMIT", &[]);
        self.inner.commit(cx)
    }

    fn rollback(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.record("ROLLBACK", &[]);
        self.inner.rollback(cx)
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn ping(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.inner.ping(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_leading_keyword() {
        let log = StatementLog::new();
        log.push("SELECT 1");
        log.push("  select * from \"QUOTE\"");
        log.push("INSERT INTO \"AUTHOR\" (\"name\") VALUES (?1)");
        log.push("BEGIN");
        assert_eq!(log.len(), 4);
        assert_eq!(log.select_count(), 2);
        assert_eq!(log.insert_count(), 1);

        let shared = log.clone();
        shared.clear();
        assert!(log.is_empty());
    }
}
