//! SQLite driver for QuoteDB.
//!
// FFI bindings require unsafe code
#![allow(unsafe_code)]
//!
//! Implements the `Connection` trait from quotedb-core over libsqlite3, with
//! SQLite compiled in from the bundled amalgamation.
//!
//! - In-memory and file-based databases, opened from a URL or a config
//! - Foreign-key enforcement switched on for every connection
//! - Constraint violations reported with the constraint's name when SQLite
//!   gives one (CHECK and named UNIQUE constraints)
//!
//! # Example
//!
//! ```rust,ignore
//! use quotedb_sqlite::{SqliteConfig, SqliteConnection};
//! use quotedb_core::{Connection, Cx, Outcome, Value};
//!
//! let conn = SqliteConnection::open(&SqliteConfig::from_url("sqlite::memory:")?)?;
//! conn.execute_raw("CREATE TABLE AUTHOR (id INTEGER PRIMARY KEY, name TEXT)")?;
//!
//! let cx = Cx::for_testing();
//! match conn.insert(&cx, "INSERT INTO AUTHOR (name) VALUES (?1)", &["Wim Hof".into()]).await {
//!     Outcome::Ok(id) => println!("inserted author {id}"),
//!     Outcome::Err(e) => eprintln!("insert failed: {e}"),
//!     _ => {}
//! }
//! ```
//!
//! # Thread Safety
//!
//! `SqliteConnection` is `Send` and `Sync`; the handle sits behind a mutex.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{MEMORY_PATH, OpenFlags, SqliteConfig, SqliteConnection, constraint_name};

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotedb_core::{Connection, Cx, Outcome, Value};

    #[test]
    fn test_sqlite_version() {
        assert!(sqlite_version().starts_with('3'));
        assert!(sqlite_version_number() >= 3_035_000);
    }

    #[test]
    fn test_connection_trait_round_trip() {
        let rt = asupersync::runtime::RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE SUBJECT (id INTEGER PRIMARY KEY AUTOINCREMENT, subject TEXT)")
            .unwrap();

        rt.block_on(async {
            let Outcome::Ok(()) = conn.begin(&cx, Default::default()).await else {
                panic!("begin failed");
            };
            let Outcome::Ok(id) = conn
                .insert(&cx, "INSERT INTO SUBJECT (subject) VALUES (?1)", &["liberty".into()])
                .await
            else {
                panic!("insert failed");
            };
            assert_eq!(id, 1);
            let Outcome::Ok(counts) = conn
                .batch(
                    &cx,
                    &[
                        ("INSERT INTO SUBJECT (subject) VALUES (?1)".to_string(), vec!["peace".into()]),
                        ("UPDATE SUBJECT SET subject = ?1 WHERE id = ?2".to_string(), vec![
                            "freedom".into(),
                            Value::BigInt(1),
                        ]),
                    ],
                )
                .await
            else {
                panic!("batch failed");
            };
            assert_eq!(counts, vec![1, 1]);
            let Outcome::Ok(()) = conn.commit(&cx).await else {
                panic!("commit failed");
            };

            let Outcome::Ok(Some(row)) = conn
                .query_one(&cx, "SELECT subject FROM SUBJECT WHERE id = ?1", &[Value::BigInt(1)])
                .await
            else {
                panic!("query failed");
            };
            assert_eq!(row.get_named::<String>("subject").unwrap(), "freedom");
            assert!(matches!(conn.ping(&cx).await, Outcome::Ok(())));
        });
    }
}
