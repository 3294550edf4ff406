//! Session factory configuration.

use quotedb_core::{ConfigError, Error, Result};
use quotedb_schema::SchemaAction;
use quotedb_sqlite::SqliteConfig;
use std::fmt;
use std::str::FromStr;

/// Default database URL: a private in-memory database.
pub const DEFAULT_URL: &str = "sqlite::memory:";

/// Database driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Driver {
    #[default]
    Sqlite,
}

impl FromStr for Driver {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            other => Err(config_error(format!("unsupported driver '{}'", other))),
        }
    }
}

/// Shared (second-level) cache mode.
///
/// No second-level cache exists; `Selective` is accepted for compatibility
/// and only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    None,
    #[default]
    Selective,
}

impl FromStr for CacheMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(CacheMode::None),
            "selective" | "enable-selective" => Ok(CacheMode::Selective),
            other => Err(config_error(format!("unknown cache mode '{}'", other))),
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheMode::None => "none",
            CacheMode::Selective => "selective",
        })
    }
}

/// Options recognised by [`SessionFactory::open`](crate::SessionFactory::open).
#[derive(Debug, Clone)]
pub struct FactoryConfig {
    pub driver: Driver,
    /// `sqlite::memory:`, `sqlite:<path>`, `sqlite://<path>` or a bare path.
    pub url: String,
    /// Accepted and ignored by SQLite.
    pub user: Option<String>,
    /// Accepted and ignored by SQLite.
    pub password: Option<String>,
    pub schema_action: SchemaAction,
    pub cache_mode: CacheMode,
    /// Log every statement at `info` under the `quotedb::sql` target.
    pub echo_sql: bool,
    pub max_connections: usize,
    pub busy_timeout_ms: u32,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            driver: Driver::Sqlite,
            url: DEFAULT_URL.to_string(),
            user: Some("sa".to_string()),
            password: Some(String::new()),
            schema_action: SchemaAction::DropAndCreate,
            cache_mode: CacheMode::Selective,
            echo_sql: false,
            max_connections: 10,
            busy_timeout_ms: 5000,
        }
    }
}

impl FactoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `QUOTEDB_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each
    /// `QUOTEDB_*` variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(url) = lookup("QUOTEDB_URL") {
            config.url = url;
        }
        if let Some(action) = lookup("QUOTEDB_SCHEMA_ACTION") {
            config.schema_action = action.parse()?;
        }
        if let Some(echo) = lookup("QUOTEDB_ECHO_SQL") {
            config.echo_sql = parse_bool("QUOTEDB_ECHO_SQL", &echo)?;
        }
        if let Some(max) = lookup("QUOTEDB_MAX_CONNECTIONS") {
            config.max_connections = max.trim().parse().map_err(|e| {
                Error::Config(ConfigError {
                    message: format!("QUOTEDB_MAX_CONNECTIONS must be a number, got '{}'", max),
                    source: Some(Box::new(e)),
                })
            })?;
        }
        Ok(config)
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn schema_action(mut self, action: SchemaAction) -> Self {
        self.schema_action = action;
        self
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn echo_sql(mut self, echo: bool) -> Self {
        self.echo_sql = echo;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout_ms(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Check the options and derive the SQLite connection settings.
    pub fn sqlite_config(&self) -> Result<SqliteConfig> {
        if self.max_connections == 0 {
            return Err(config_error(
                "max_connections must be at least 1".to_string(),
            ));
        }
        match self.driver {
            Driver::Sqlite => Ok(SqliteConfig::from_url(&self.url)?.busy_timeout(self.busy_timeout_ms)),
        }
    }

    /// The pool size actually used.
    ///
    /// An in-memory database lives inside one connection, so a memory URL
    /// always gets a single connection.
    pub fn effective_max_connections(&self) -> Result<usize> {
        if self.sqlite_config()?.is_memory() {
            Ok(1)
        } else {
            Ok(self.max_connections)
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(config_error(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn config_error(message: String) -> Error {
    Error::Config(ConfigError {
        message,
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_demo_setup() {
        let config = FactoryConfig::default();
        assert_eq!(config.url, "sqlite::memory:");
        assert_eq!(config.schema_action, SchemaAction::DropAndCreate);
        assert_eq!(config.cache_mode, CacheMode::Selective);
        assert!(!config.echo_sql);
        assert_eq!(config.effective_max_connections().unwrap(), 1);
    }

    #[test]
    fn environment_overrides() {
        let config = FactoryConfig::from_lookup(lookup(&[
            ("QUOTEDB_URL", "sqlite:/tmp/quotes.db"),
            ("QUOTEDB_SCHEMA_ACTION", "validate"),
            ("QUOTEDB_ECHO_SQL", "true"),
            ("QUOTEDB_MAX_CONNECTIONS", "4"),
        ]))
        .unwrap();
        assert_eq!(config.schema_action, SchemaAction::Validate);
        assert!(config.echo_sql);
        assert_eq!(config.sqlite_config().unwrap().path, "/tmp/quotes.db");
        assert_eq!(config.effective_max_connections().unwrap(), 4);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for vars in [
            [("QUOTEDB_SCHEMA_ACTION", "update")],
            [("QUOTEDB_ECHO_SQL", "maybe")],
            [("QUOTEDB_MAX_CONNECTIONS", "many")],
        ] {
            let err = FactoryConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{vars:?}: {err}");
        }
        assert!("postgres".parse::<Driver>().is_err());
        assert!("all".parse::<CacheMode>().is_err());
        assert!(FactoryConfig::new().max_connections(0).sqlite_config().is_err());
        assert!(FactoryConfig::new().url("mysql://db").sqlite_config().is_err());
    }

    #[test]
    fn builder() {
        let config = FactoryConfig::new()
            .url("quotes.db")
            .user("reader")
            .password("secret")
            .cache_mode(CacheMode::None)
            .echo_sql(true)
            .busy_timeout_ms(250)
            .max_connections(3);
        let sqlite = config.sqlite_config().unwrap();
        assert_eq!(sqlite.path, "quotes.db");
        assert_eq!(sqlite.busy_timeout_ms, 250);
        assert_eq!(config.user.as_deref(), Some("reader"));
        assert_eq!(config.cache_mode.to_string(), "none");
        assert_eq!(config.effective_max_connections().unwrap(), 3);
    }
}
