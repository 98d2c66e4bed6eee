//! [`Database`] adapter over an embedded SQLite connection (`rusqlite`)

use crate::database::{Database, DbError, Row, Value};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::path::Path;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single SQLite connection
///
/// Open one per thread; `rusqlite::Connection` is not `Sync`. Concurrent
/// writers on the same file wait up to the busy timeout, then fail with
/// [`DbError::Busy`].
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path).map_err(|e| DbError::Connection(e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory().map_err(|e| DbError::Connection(e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, DbError> {
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Replace the default five second busy timeout
    pub fn with_busy_timeout(self, timeout: Duration) -> Result<Self, DbError> {
        self.conn.busy_timeout(timeout)?;
        Ok(self)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Bool(b) => ToSqlOutput::from(*b),
            Value::Int(i) => ToSqlOutput::from(*i),
            Value::Real(r) => ToSqlOutput::from(*r),
            Value::Decimal(d) => ToSqlOutput::from(d.to_string()),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Bytes(b) => ToSqlOutput::from(b.as_slice()),
            Value::Guid(g) => ToSqlOutput::from(g.to_string()),
            Value::DateTime(dt) => ToSqlOutput::from(dt.format(DATE_TIME_FORMAT).to_string()),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Result<Value, DbError> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) => Value::Text(
            std::str::from_utf8(t)
                .map_err(|e| DbError::Conversion(e.to_string()))?
                .to_string(),
        ),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    })
}

impl Database for SqliteDatabase {
    fn provider_name(&self) -> &str {
        "Sqlite"
    }

    fn execute(&self, query: &str, params: &[Value]) -> Result<u64, DbError> {
        let affected = self.conn.execute(query, params_from_iter(params.iter()))?;
        Ok(affected as u64)
    }

    fn query_all(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let mut stmt = self.conn.prepare(query)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..width)
                .map(|i| from_value_ref(row.get_ref(i)?))
                .collect::<Result<Vec<_>, DbError>>()?;
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }

    fn begin(&self) -> Result<(), DbError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&self) -> Result<(), DbError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> Result<(), DbError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_and_query() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (id INTEGER, name TEXT, flag INTEGER)", &[]).unwrap();
        let affected = db
            .execute(
                "INSERT INTO t (id, name, flag) VALUES (?1, ?2, ?3)",
                &[Value::Int(1), Value::from("one"), Value::Bool(true)],
            )
            .unwrap();
        assert_eq!(affected, 1);

        let row = db.query_one("SELECT id, name, flag FROM t", &[]).unwrap();
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get_str("name").unwrap(), "one");
        assert_eq!(row.get("flag").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn test_query_one_without_rows() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (id INTEGER)", &[]).unwrap();
        assert!(matches!(db.query_one("SELECT id FROM t", &[]), Err(DbError::NoRows)));
    }

    #[test]
    fn test_transaction_rollback() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (id INTEGER)", &[]).unwrap();
        db.begin().unwrap();
        db.execute("INSERT INTO t VALUES (1)", &[]).unwrap();
        db.rollback().unwrap();
        assert!(db.query_all("SELECT id FROM t", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_write_behind_another_writer_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.db");
        let writer = SqliteDatabase::open(&path).unwrap();
        writer.execute("CREATE TABLE t (id INTEGER)", &[]).unwrap();
        writer.begin().unwrap();
        writer.execute("INSERT INTO t VALUES (1)", &[]).unwrap();

        let other = SqliteDatabase::open(&path)
            .unwrap()
            .with_busy_timeout(Duration::from_millis(10))
            .unwrap();
        let err = other.execute("INSERT INTO t VALUES (2)", &[]).unwrap_err();
        assert!(matches!(err, DbError::Busy(_)), "{err}");

        writer.commit().unwrap();
        assert_eq!(other.execute("INSERT INTO t VALUES (2)", &[]).unwrap(), 1);
    }

    #[test]
    fn test_bad_sql_is_query_error() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        assert!(matches!(db.execute("CREATE TABL x", &[]), Err(DbError::Query(_))));
    }
}
