//! Live schema introspection for validation.

use crate::ddl::ExpectedTable;
use quotedb_core::{
    Connection, Cx, Dialect, Error, Outcome, SchemaError, SchemaErrorKind, try_outcome,
};

/// Column names of `table`, or `None` when the table does not exist.
pub async fn table_columns<C: Connection>(
    cx: &Cx,
    conn: &C,
    table: &str,
) -> Outcome<Option<Vec<String>>, Error> {
    let sql = format!(
        "PRAGMA table_info({})",
        Dialect::Sqlite.quote_identifier(table)
    );
    let rows = try_outcome!(conn.query(cx, &sql, &[]).await);
    if rows.is_empty() {
        return Outcome::Ok(None);
    }
    let columns = rows
        .iter()
        .filter_map(|row| {
            row.get_by_name("name")
                .and_then(|v| v.as_str().map(String::from))
        })
        .collect();
    Outcome::Ok(Some(columns))
}

/// Check every expected table and column against the live database.
///
/// All problems are reported together in one error; its kind is
/// `TableNotFound` when at least one table is missing.
pub async fn validate_tables<C: Connection>(
    cx: &Cx,
    conn: &C,
    expected: &[ExpectedTable],
) -> Outcome<(), Error> {
    let mut missing_tables = Vec::new();
    let mut missing_columns = Vec::new();

    for table in expected {
        let Some(actual) = try_outcome!(table_columns(cx, conn, table.name).await) else {
            missing_tables.push(table.name.to_string());
            continue;
        };
        for column in &table.columns {
            if !actual.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                missing_columns.push(format!("{}.{}", table.name, column));
            }
        }
    }

    if missing_tables.is_empty() && missing_columns.is_empty() {
        tracing::debug!(tables = expected.len(), "Schema validated");
        return Outcome::Ok(());
    }

    let kind = if missing_tables.is_empty() {
        SchemaErrorKind::ColumnNotFound
    } else {
        SchemaErrorKind::TableNotFound
    };
    let mut problems = Vec::new();
    if !missing_tables.is_empty() {
        problems.push(format!("missing tables: {}", missing_tables.join(", ")));
    }
    if !missing_columns.is_empty() {
        problems.push(format!("missing columns: {}", missing_columns.join(", ")));
    }
    Outcome::Err(Error::Schema(SchemaError {
        kind,
        message: format!("schema validation failed; {}", problems.join("; ")),
    }))
}
