//! SQLite implementation of [`QueryExecutor`] over `rusqlite`.

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql};
use serde_json::{Number, Value};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::info;

use super::{BackendError, Param, QueryExecutor, Row};

const THINGS_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS things (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
)";

impl ToSql for Param {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Param::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Param::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            Param::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            Param::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

/// Single-connection SQLite executor.
///
/// The connection sits behind a mutex: one statement runs at a time no matter
/// how many tasks query concurrently.
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
}

impl SqliteExecutor {
    /// Open (or create) a database file.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Connection`] when the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let conn = Connection::open(path)
            .map_err(|e| BackendError::Connection(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "Opened SQLite backend");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Connection`] if SQLite cannot allocate it.
    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn =
            Connection::open_in_memory().map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create the `things` table if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Query`] if the DDL fails.
    pub fn ensure_things_schema(&self) -> Result<(), BackendError> {
        self.execute(THINGS_SCHEMA, &[]).map(|_| ())
    }
}

fn column_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

impl QueryExecutor for SqliteExecutor {
    fn execute(&self, sql: &str, params: &[Param]) -> Result<Vec<Row>, BackendError> {
        let query_err = |e: rusqlite::Error| BackendError::Query {
            sql: sql.to_string(),
            message: e.to_string(),
        };

        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(sql).map_err(query_err)?;

        if stmt.column_count() == 0 {
            stmt.execute(rusqlite::params_from_iter(params.iter()))
                .map_err(query_err)?;
            return Ok(Vec::new());
        }

        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter()))
            .map_err(query_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(query_err)? {
            let mut record = Row::new();
            for (idx, name) in columns.iter().enumerate() {
                let value = row.get_ref(idx).map_err(query_err)?;
                record.insert(name.clone(), column_value(value));
            }
            out.push(record);
        }
        Ok(out)
    }
}
