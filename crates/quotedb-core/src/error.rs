//! Error types for QuoteDB operations.

use std::fmt;

/// The primary error type for all QuoteDB operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, transport lost)
    Connection(ConnectionError),
    /// Query execution errors, including constraint violations
    Query(QueryError),
    /// Type conversion errors while decoding rows
    Type(TypeError),
    /// Load plan or filter rejected against the metadata
    Plan(PlanError),
    /// Projection found a relationship that was never materialized
    IncompleteGraph {
        /// Entity that owns the unmaterialized relationship
        entity: &'static str,
        /// Dotted path from the projected root to the relationship
        path: String,
    },
    /// Session misuse (closed, not in a transaction, non-transient persist)
    Session(SessionError),
    /// Pool errors
    Pool(PoolError),
    /// Schema errors (DDL generation, validation)
    Schema(SchemaError),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection lost during operation
    Disconnected,
    /// Connection already closed or returned to its pool
    Closed,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    /// Name of the violated constraint, when the driver reports one
    pub constraint: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, check, not null)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Data too large for column
    DataTruncation,
    /// Database busy or locked
    Busy,
    /// Cancelled
    Cancelled,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlanError {
    pub kind: PlanErrorKind,
    /// Entity the path was resolved against
    pub entity: &'static str,
    /// The offending dotted path
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanErrorKind {
    /// A load plan names a relationship that does not exist
    InvalidLoadPlan,
    /// A filter path or parameter does not match the metadata
    InvalidFilter,
}

#[derive(Debug)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// The session has been closed
    Closed,
    /// The operation needs an active transaction
    NotInTransaction,
    /// `begin` called while a transaction is active
    AlreadyInTransaction,
    /// `persist` called on an entity that already has an id or is tracked
    NotTransient,
    /// The entity is not managed by this session
    NotManaged,
    /// A to-one reference points at an entity that is neither persisted nor staged
    TransientReference,
    /// A previous flush failed; only `close` is allowed
    Unusable,
}

#[derive(Debug)]
pub struct PoolError {
    pub kind: PoolErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolErrorKind {
    /// Pool exhausted (no available connections)
    Exhausted,
    /// Pool is closed
    Closed,
    /// Configuration error
    Config,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Table not found
    TableNotFound,
    /// Column not found
    ColumnNotFound,
    /// Invalid metadata (unknown relationship target, missing primary key)
    Invalid,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Build an `IncompleteGraph` error for a relationship of `entity`.
    pub fn incomplete_graph(entity: &'static str, path: impl Into<String>) -> Self {
        Error::IncompleteGraph {
            entity,
            path: path.into(),
        }
    }

    /// Build a session error.
    pub fn session(kind: SessionErrorKind, message: impl Into<String>) -> Self {
        Error::Session(SessionError {
            kind,
            message: message.into(),
        })
    }

    /// Prefix the path of an `IncompleteGraph` error with the relationship it was reached through.
    ///
    /// Other errors pass through unchanged.
    #[must_use]
    pub fn nested_in(self, relationship: &str) -> Self {
        match self {
            Error::IncompleteGraph { entity, path } => Error::IncompleteGraph {
                entity,
                path: format!("{relationship}.{path}"),
            },
            other => other,
        }
    }

    /// Is this a constraint violation reported by the database?
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Error::Query(q) if q.kind == QueryErrorKind::Constraint)
    }

    /// Name of the violated constraint, if the driver reported one.
    pub fn constraint_name(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.constraint.as_deref(),
            _ => None,
        }
    }

    /// Is this a connection error that requires a fresh session?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(_) | Error::Io(_) => true,
            _ => false,
        }
    }

    /// Is this an `IncompleteGraph` projection failure?
    pub fn is_incomplete_graph(&self) -> bool {
        matches!(self, Error::IncompleteGraph { .. })
    }

    /// The plan error kind, if this error was raised while building a query.
    pub fn plan_kind(&self) -> Option<PlanErrorKind> {
        match self {
            Error::Plan(p) => Some(p.kind),
            _ => None,
        }
    }

    /// The session error kind, if this is a session misuse error.
    pub fn session_kind(&self) -> Option<SessionErrorKind> {
        match self {
            Error::Session(s) => Some(s.kind),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl PlanError {
    pub fn invalid_load_plan(
        entity: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: PlanErrorKind::InvalidLoadPlan,
            entity,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn invalid_filter(
        entity: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: PlanErrorKind::InvalidFilter,
            entity,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Plan(e) => write!(f, "{}", e),
            Error::IncompleteGraph { entity, path } => write!(
                f,
                "Incomplete graph: relationship '{}' of {} was not materialized",
                path, entity
            ),
            Error::Session(e) => write!(f, "Session error: {}", e.message),
            Error::Pool(e) => write!(f, "Pool error: {}", e.message),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(constraint) = &self.constraint {
            write!(f, "{} (constraint {})", self.message, constraint)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            PlanErrorKind::InvalidLoadPlan => "Invalid load plan",
            PlanErrorKind::InvalidFilter => "Invalid filter",
        };
        write!(
            f,
            "{} for {}: '{}': {}",
            label, self.entity, self.path, self.message
        )
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<PlanError> for Error {
    fn from(err: PlanError) -> Self {
        Error::Plan(err)
    }
}

impl From<SessionError> for Error {
    fn from(err: SessionError) -> Self {
        Error::Session(err)
    }
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Self {
        Error::Pool(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for QuoteDB operations.
pub type Result<T> = std::result::Result<T, Error>;
