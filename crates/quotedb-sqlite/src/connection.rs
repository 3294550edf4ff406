//! SQLite connection implementation.
//!
//! Safe wrappers around SQLite's C API implementing the `Connection` trait
//! from quotedb-core. Each connection enables foreign-key enforcement when it
//! opens, so link-table and author references are checked by the database.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers
#![allow(clippy::if_not_else)] // Clearer for error handling

use crate::ffi;
use crate::types;
use quotedb_core::{
    ColumnInfo, ConfigError, Connection, ConnectionError, ConnectionErrorKind, Cx, Error,
    IsolationLevel, Outcome, QueryError, QueryErrorKind, Row, Value,
};
use regex::Regex;
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Path SQLite interprets as a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Run `PRAGMA foreign_keys = ON` after opening.
    pub foreign_keys: bool,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;
        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }
        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: MEMORY_PATH.to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Parse a database URL.
    ///
    /// Accepts `sqlite::memory:`, `sqlite:<path>`, `sqlite://<path>` and a
    /// bare path.
    pub fn from_url(url: &str) -> Result<Self, Error> {
        let url = url.trim();
        let path = match url.split_once(':') {
            Some(("sqlite", rest)) => rest.strip_prefix("//").unwrap_or(rest),
            Some((scheme, _)) if scheme.len() > 1 && !scheme.contains(['/', '\\', '.']) => {
                return Err(Error::Config(ConfigError {
                    message: format!("unsupported database URL scheme '{scheme}'"),
                    source: None,
                }));
            }
            _ => url,
        };
        if path.is_empty() {
            return Err(Error::Config(ConfigError {
                message: format!("database URL '{url}' has no path"),
                source: None,
            }));
        }
        if path == ":memory:" || path == MEMORY_PATH {
            Ok(Self::memory())
        } else {
            Ok(Self::file(path))
        }
    }

    /// Whether this config opens a private in-memory database.
    pub fn is_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Enable or disable foreign-key enforcement.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}

/// Inner state of the SQLite connection, protected by a mutex for thread safety.
struct SqliteInner {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
}

// SAFETY: the handle is only used while holding the connection's mutex.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("in_transaction", &self.lock().in_transaction)
            .finish()
    }
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self, Error> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if !db.is_null() {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = errmsg(db);
                    ffi::sqlite3_close_v2(db);
                    msg
                }
            } else {
                ffi::error_string(rc).to_string()
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database '{}': {}", config.path, msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        let conn = Self {
            inner: Mutex::new(SqliteInner {
                db,
                in_transaction: false,
            }),
            path: config.path.clone(),
        };
        if config.foreign_keys {
            conn.execute_raw("PRAGMA foreign_keys = ON")?;
        }
        if !config.is_memory() {
            // Opening is lazy; reading the schema rejects files that are not databases.
            conn.execute_raw("SELECT count(*) FROM sqlite_master")?;
        }
        tracing::debug!(path = %config.path, "Opened SQLite connection");
        Ok(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, Error> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self, Error> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Execute one or more `;`-separated statements without parameters.
    pub fn execute_raw(&self, sql: &str) -> Result<(), Error> {
        let inner = self.lock();
        exec(inner.db, sql)
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> i32 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_changes(inner.db) }
    }

    /// Prepare and execute a query, returning all rows.
    fn query_sync(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        let inner = self.lock();
        let stmt = Statement::prepare(inner.db, sql)?;
        stmt.bind_all(params)?;

        let col_count = stmt.column_count();
        let mut col_names = Vec::with_capacity(col_count as usize);
        for i in 0..col_count {
            // SAFETY: stmt is valid, i is in range
            let name =
                unsafe { types::column_name(stmt.raw, i) }.unwrap_or_else(|| format!("col{}", i));
            col_names.push(name);
        }
        let columns = Arc::new(ColumnInfo::new(col_names));

        let mut rows = Vec::new();
        loop {
            match stmt.step() {
                ffi::SQLITE_ROW => {
                    let mut values = Vec::with_capacity(col_count as usize);
                    for i in 0..col_count {
                        // SAFETY: stmt is valid, we just got SQLITE_ROW
                        values.push(unsafe { types::read_column(stmt.raw, i) });
                    }
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(step_error(inner.db, sql)),
            }
        }
        tracing::trace!(sql = %sql, rows = rows.len(), "SQLite query");
        Ok(rows)
    }

    /// Prepare and execute a statement, returning rows affected.
    fn execute_sync(&self, sql: &str, params: &[Value]) -> Result<u64, Error> {
        let inner = self.lock();
        run(inner.db, sql, params)
    }

    /// Execute an INSERT and return the rowid it generated.
    fn insert_sync(&self, sql: &str, params: &[Value]) -> Result<i64, Error> {
        let inner = self.lock();
        run(inner.db, sql, params)?;
        // SAFETY: db is valid; the lock is still held so no other insert intervened
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(inner.db) })
    }

    /// Begin a transaction.
    fn begin_sync(&self, isolation: IsolationLevel) -> Result<(), Error> {
        let mut inner = self.lock();
        if inner.in_transaction {
            return Err(transaction_error("Already in a transaction"));
        }

        // SQLite has no isolation levels; approximate with lock acquisition modes
        let begin_sql = match isolation {
            IsolationLevel::Serializable => "BEGIN EXCLUSIVE",
            IsolationLevel::RepeatableRead | IsolationLevel::ReadCommitted => "BEGIN IMMEDIATE",
        };
        exec(inner.db, begin_sql)?;
        inner.in_transaction = true;
        tracing::trace!(sql = begin_sql, "SQLite transaction started");
        Ok(())
    }

    /// Commit the current transaction.
    fn commit_sync(&self) -> Result<(), Error> {
        let mut inner = self.lock();
        if !inner.in_transaction {
            return Err(transaction_error("Not in a transaction"));
        }
        exec(inner.db, "COMMIT")?;
        inner.in_transaction = false;
        Ok(())
    }

    /// Rollback the current transaction.
    fn rollback_sync(&self) -> Result<(), Error> {
        let mut inner = self.lock();
        if !inner.in_transaction {
            return Err(transaction_error("Not in a transaction"));
        }
        inner.in_transaction = false;
        // SAFETY: db is valid
        let autocommit = unsafe { ffi::sqlite3_get_autocommit(inner.db) } != 0;
        if autocommit {
            // SQLite already rolled back (e.g. after an I/O error)
            return Ok(());
        }
        exec(inner.db, "ROLLBACK")
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock();
        if !inner.db.is_null() {
            // SAFETY: db is valid and never used again
            unsafe {
                ffi::sqlite3_close_v2(inner.db);
            }
        }
    }
}

impl Connection for SqliteConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.query_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let result = self
            .query_sync(sql, params)
            .map(|rows| rows.into_iter().next());
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.execute_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let result = self.insert_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn batch(
        &self,
        _cx: &Cx,
        statements: &[(String, Vec<Value>)],
    ) -> impl Future<Output = Outcome<Vec<u64>, Error>> + Send {
        let mut results = Vec::with_capacity(statements.len());
        let mut error = None;

        for (sql, params) in statements {
            match self.execute_sync(sql, params) {
                Ok(n) => results.push(n),
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }

        async move {
            match error {
                Some(e) => Outcome::Err(e),
                None => Outcome::Ok(results),
            }
        }
    }

    fn begin(
        &self,
        _cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.begin_sync(isolation);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn commit(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.commit_sync();
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn rollback(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.rollback_sync();
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn in_transaction(&self) -> bool {
        self.lock().in_transaction
    }

    fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.query_sync("SELECT 1", &[]).map(|_| ());
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }
}

/// A prepared statement, finalized on drop.
struct Statement {
    raw: *mut ffi::sqlite3_stmt,
    db: *mut ffi::sqlite3,
    sql_len: usize,
}

impl Statement {
    fn prepare(db: *mut ffi::sqlite3, sql: &str) -> Result<Self, Error> {
        let c_sql = CString::new(sql).map_err(|_| {
            query_error(QueryErrorKind::Syntax, sql, "SQL contains null byte".to_string())
        })?;
        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut raw,
                ptr::null_mut(),
            )
        };
        if rc != ffi::SQLITE_OK {
            return Err(step_error(db, sql));
        }
        Ok(Self {
            raw,
            db,
            sql_len: sql.len(),
        })
    }

    fn bind_all(&self, params: &[Value]) -> Result<(), Error> {
        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid, index is 1-based
            let rc = unsafe { types::bind_value(self.raw, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: db is valid
                let msg = unsafe { errmsg(self.db) };
                return Err(Error::Query(QueryError {
                    kind: QueryErrorKind::Database,
                    sql: None,
                    constraint: None,
                    message: format!(
                        "Failed to bind parameter {} of a {}-byte statement: {}",
                        i + 1,
                        self.sql_len,
                        msg
                    ),
                    source: None,
                }));
            }
        }
        Ok(())
    }

    fn column_count(&self) -> c_int {
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_column_count(self.raw) }
    }

    fn step(&self) -> c_int {
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_step(self.raw) }
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: stmt is valid and finalized exactly once
        unsafe {
            ffi::sqlite3_finalize(self.raw);
        }
    }
}

// Helper functions

fn run(db: *mut ffi::sqlite3, sql: &str, params: &[Value]) -> Result<u64, Error> {
    let stmt = Statement::prepare(db, sql)?;
    stmt.bind_all(params)?;
    match stmt.step() {
        ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
            // SAFETY: db is valid
            let changes = unsafe { ffi::sqlite3_changes(db) };
            tracing::trace!(sql = %sql, changes, "SQLite statement");
            Ok(changes as u64)
        }
        _ => Err(step_error(db, sql)),
    }
}

fn exec(db: *mut ffi::sqlite3, sql: &str) -> Result<(), Error> {
    let c_sql = CString::new(sql).map_err(|_| {
        query_error(QueryErrorKind::Syntax, sql, "SQL contains null byte".to_string())
    })?;
    let mut err: *mut std::ffi::c_char = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut err) };

    if rc != ffi::SQLITE_OK {
        let msg = if !err.is_null() {
            // SAFETY: err is a valid C string allocated by SQLite
            let msg = unsafe { CStr::from_ptr(err).to_string_lossy().into_owned() };
            // SAFETY: err was allocated by sqlite3_malloc
            unsafe { ffi::sqlite3_free(err.cast()) };
            msg
        } else {
            ffi::error_string(rc).to_string()
        };
        return Err(classify(rc, sql, msg));
    }
    Ok(())
}

/// # Safety
/// `db` must be a valid connection handle.
unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: guaranteed by the caller
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
        .to_string_lossy()
        .into_owned()
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (code, msg) = unsafe { (ffi::sqlite3_errcode(db), errmsg(db)) };
    classify(code, sql, msg)
}

fn classify(code: c_int, sql: &str, message: String) -> Error {
    if matches!(
        ffi::primary_code(code),
        ffi::SQLITE_IOERR | ffi::SQLITE_CANTOPEN | ffi::SQLITE_NOTADB
    ) {
        return Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Disconnected,
            message,
            source: None,
        });
    }
    let kind = error_code_to_kind(code);
    let constraint = if kind == QueryErrorKind::Constraint {
        constraint_name(&message)
    } else {
        None
    };
    Error::Query(QueryError {
        kind,
        sql: Some(sql.to_string()),
        constraint,
        message,
        source: None,
    })
}

fn query_error(kind: QueryErrorKind, sql: &str, message: String) -> Error {
    Error::Query(QueryError {
        kind,
        sql: Some(sql.to_string()),
        constraint: None,
        message,
        source: None,
    })
}

fn transaction_error(message: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Database,
        sql: None,
        constraint: None,
        message: message.to_string(),
        source: None,
    })
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match ffi::primary_code(code) {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Cancelled,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}

/// The constraint named in a SQLite constraint message, e.g.
/// `CHECK constraint failed: CK_QUOTE_QUOTETEXT_LENGTH`.
///
/// Foreign-key failures carry no name.
pub fn constraint_name(message: &str) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"constraint failed: (.+)$").ok())
        .as_ref()?;
    pattern
        .captures(message)
        .map(|caps| caps[1].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SqliteConnection {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw(
            "CREATE TABLE author (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);
             CREATE TABLE quote (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 text TEXT NOT NULL,
                 authorId INTEGER NOT NULL,
                 CONSTRAINT CK_QUOTE_TEXT_LENGTH CHECK (length(text) <= 10),
                 CONSTRAINT FK_QUOTE_AUTHOR FOREIGN KEY (authorId) REFERENCES author (id)
             );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_open_memory() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_url_parsing() {
        assert!(SqliteConfig::from_url("sqlite::memory:").unwrap().is_memory());
        assert!(SqliteConfig::from_url(":memory:").unwrap().is_memory());
        assert_eq!(SqliteConfig::from_url("sqlite:quotes.db").unwrap().path, "quotes.db");
        assert_eq!(
            SqliteConfig::from_url("sqlite:///tmp/quotes.db").unwrap().path,
            "/tmp/quotes.db"
        );
        assert_eq!(SqliteConfig::from_url("data/quotes.db").unwrap().path, "data/quotes.db");
        assert!(SqliteConfig::from_url("postgres://localhost/quotes").is_err());
        assert!(SqliteConfig::from_url("sqlite:").is_err());
    }

    #[test]
    fn test_insert_returns_rowid() {
        let conn = catalog();
        let first = conn
            .insert_sync("INSERT INTO author (name) VALUES (?1)", &["Wim Hof".into()])
            .unwrap();
        let second = conn
            .insert_sync("INSERT INTO author (name) VALUES (?1)", &["Ron Paul".into()])
            .unwrap();
        assert_eq!((first, second), (1, 2));

        let rows = conn
            .query_sync("SELECT id, name FROM author WHERE name = ?1", &["Ron Paul".into()])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_named::<i64>("id").unwrap(), 2);
        assert_eq!(rows[0].get_named::<String>("name").unwrap(), "Ron Paul");
    }

    #[test]
    fn test_null_handling() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        conn.execute_sync("INSERT INTO t (name) VALUES (?1)", &[Value::Null])
            .unwrap();
        let rows = conn.query_sync("SELECT * FROM t", &[]).unwrap();
        assert_eq!(rows[0].get_named::<Option<String>>("name").unwrap(), None);
    }

    #[test]
    fn test_check_constraint_is_named() {
        let conn = catalog();
        conn.insert_sync("INSERT INTO author (name) VALUES (?1)", &["Wim Hof".into()])
            .unwrap();
        let err = conn
            .insert_sync(
                "INSERT INTO quote (text, authorId) VALUES (?1, ?2)",
                &["far too long for ten".into(), Value::BigInt(1)],
            )
            .unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(err.constraint_name(), Some("CK_QUOTE_TEXT_LENGTH"));
        assert!(err.sql().is_some());
    }

    #[test]
    fn test_foreign_keys_are_enforced() {
        let conn = catalog();
        let err = conn
            .insert_sync(
                "INSERT INTO quote (text, authorId) VALUES (?1, ?2)",
                &["short".into(), Value::BigInt(42)],
            )
            .unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(err.constraint_name(), None);
    }

    #[test]
    fn test_transaction() {
        let conn = catalog();

        conn.begin_sync(IsolationLevel::default()).unwrap();
        assert!(conn.in_transaction());
        conn.execute_sync("INSERT INTO author (name) VALUES (?1)", &["Alice".into()])
            .unwrap();
        conn.rollback_sync().unwrap();
        assert!(conn.query_sync("SELECT * FROM author", &[]).unwrap().is_empty());

        conn.begin_sync(IsolationLevel::default()).unwrap();
        conn.execute_sync("INSERT INTO author (name) VALUES (?1)", &["Bob".into()])
            .unwrap();
        conn.commit_sync().unwrap();
        assert_eq!(conn.query_sync("SELECT * FROM author", &[]).unwrap().len(), 1);

        assert!(conn.commit_sync().is_err());
        conn.begin_sync(IsolationLevel::Serializable).unwrap();
        assert!(conn.begin_sync(IsolationLevel::default()).is_err());
        conn.rollback_sync().unwrap();
    }

    #[test]
    fn test_syntax_error_kind() {
        let conn = SqliteConnection::open_memory().unwrap();
        let err = conn.query_sync("SELEKT 1", &[]).unwrap_err();
        assert!(matches!(err, Error::Query(ref q) if q.kind == QueryErrorKind::Syntax));
    }

    #[test]
    fn test_io_failures_classify_as_connection_errors() {
        let io = classify(ffi::SQLITE_IOERR, "SELECT 1", "disk I/O error".to_string());
        assert!(io.is_connection_error());
        assert!(matches!(
            io,
            Error::Connection(ref c) if c.kind == ConnectionErrorKind::Disconnected
        ));

        // Extended codes share the primary code
        let short_read = classify(ffi::SQLITE_IOERR | (2 << 8), "SELECT 1", "short read".to_string());
        assert!(short_read.is_connection_error());

        let not_a_db = classify(ffi::SQLITE_NOTADB, "SELECT 1", "file is not a database".to_string());
        assert!(not_a_db.is_connection_error());

        let constraint = classify(ffi::SQLITE_CONSTRAINT, "INSERT", "constraint failed".to_string());
        assert!(!constraint.is_connection_error());
        assert!(constraint.is_constraint_violation());
    }

    #[test]
    fn test_open_rejects_a_file_that_is_not_a_database() {
        let path = std::env::temp_dir().join(format!("quotedb-not-a-db-{}.db", std::process::id()));
        std::fs::write(&path, vec![0x5a_u8; 8192]).unwrap();

        let result = SqliteConnection::open_file(path.to_string_lossy().into_owned());
        std::fs::remove_file(&path).unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Connection(_)), "unexpected error: {err}");
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_constraint_name_extraction() {
        assert_eq!(
            constraint_name("CHECK constraint failed: CK_QUOTE_QUOTETEXT_LENGTH").as_deref(),
            Some("CK_QUOTE_QUOTETEXT_LENGTH")
        );
        assert_eq!(
            constraint_name("UNIQUE constraint failed: AUTHOR.name").as_deref(),
            Some("AUTHOR.name")
        );
        assert_eq!(constraint_name("FOREIGN KEY constraint failed"), None);
    }
}
