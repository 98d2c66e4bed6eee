//! Database capability surface consumed by the migration engine.
//!
//! The engine never owns connection management. Hosts hand it something that
//! implements [`Database`]: execute a statement, fetch rows, open/close a
//! transaction, and report the active provider name. The provider name selects
//! the [`SqlSyntaxProvider`](crate::syntax::SqlSyntaxProvider) and gates
//! `if_database` blocks.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Errors reported by a [`Database`] implementation
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The statement was rejected or failed while running
    #[error("query error: {0}")]
    Query(String),
    /// The connection could not be opened or was lost
    #[error("connection error: {0}")]
    Connection(String),
    /// A returned value could not be converted
    #[error("conversion error: {0}")]
    Conversion(String),
    /// `query_one` found no row
    #[error("query returned no rows")]
    NoRows,
    /// Another connection holds a conflicting lock on the database
    #[error("database is busy: {0}")]
    Busy(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => DbError::NoRows,
            rusqlite::Error::SqliteFailure(e, msg)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                DbError::Busy(msg.unwrap_or_else(|| e.to_string()))
            }
            rusqlite::Error::FromSqlConversionFailure(_, _, e) => DbError::Conversion(e.to_string()),
            rusqlite::Error::InvalidColumnType(idx, name, ty) => {
                DbError::Conversion(format!("column {idx} ({name}) has type {ty}"))
            }
            other => DbError::Query(other.to_string()),
        }
    }
}

/// The closed set of database engines the engine can render SQL for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseProvider {
    SqlServer,
    Sqlite,
    Postgres,
}

impl DatabaseProvider {
    /// Canonical provider name, as reported by the bundled adapters
    pub fn name(&self) -> &'static str {
        match self {
            DatabaseProvider::SqlServer => "SqlServer",
            DatabaseProvider::Sqlite => "Sqlite",
            DatabaseProvider::Postgres => "Postgres",
        }
    }
}

impl fmt::Display for DatabaseProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatabaseProvider {
    type Err = String;

    /// Accepts canonical names and the usual driver/provider aliases
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlserver" | "mssql" | "microsoft.data.sqlclient" | "system.data.sqlclient" => {
                Ok(DatabaseProvider::SqlServer)
            }
            "sqlite" | "sqlite3" | "microsoft.data.sqlite" => Ok(DatabaseProvider::Sqlite),
            "postgres" | "postgresql" | "pg" | "npgsql" => Ok(DatabaseProvider::Postgres),
            other => Err(other.to_string()),
        }
    }
}

/// A single SQL value, used for parameters, literals, and fetched cells
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Guid(Uuid),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; booleans and integral reals are accepted since SQLite
    /// stores both as plain numbers
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Real(r) if r.fract() == 0.0 => Some(*r as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Guid(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A fetched row: column names in select order plus their values
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Value by position
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value by column name (case-insensitive, first match wins)
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    /// Text value of a column, with a descriptive error when missing or not text
    pub fn get_str(&self, column: &str) -> Result<&str, DbError> {
        match self.get(column) {
            Some(Value::Text(s)) => Ok(s),
            Some(other) => Err(DbError::Conversion(format!(
                "column {column} is not text: {other:?}"
            ))),
            None => Err(DbError::Conversion(format!("column {column} not in row"))),
        }
    }
}

/// Trait for executing database operations
///
/// This is the only way the engine talks to a database. Implementations wrap
/// a live connection (direct client, pooled connection, ...). All methods take
/// `&self`; the engine drives one connection from one thread.
///
/// Parameter placeholders in `query` follow the active dialect, see
/// [`SqlSyntaxProvider::parameter`](crate::syntax::SqlSyntaxProvider::parameter).
///
/// # Examples
///
/// ```no_run
/// # use tidemark::database::{Database, DbError, Value};
/// # fn example(db: &dyn Database) -> Result<(), DbError> {
/// let affected = db.execute("DELETE FROM person WHERE id = ?1", &[Value::Int(42)])?;
/// let rows = db.query_all("SELECT id, name FROM person", &[])?;
/// for row in &rows {
///     println!("{:?}", row.get("name"));
/// }
/// # Ok(())
/// # }
/// ```
pub trait Database {
    /// Name of the active provider (e.g. `"Sqlite"`, `"SqlServer"`, `"Npgsql"`)
    fn provider_name(&self) -> &str;

    /// Execute a statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    fn execute(&self, query: &str, params: &[Value]) -> Result<u64, DbError>;

    /// Execute a query and return all rows
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails.
    fn query_all(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, DbError>;

    /// Execute a query and return its first row
    ///
    /// # Errors
    ///
    /// Returns `DbError::NoRows` when the query yields nothing.
    fn query_one(&self, query: &str, params: &[Value]) -> Result<Row, DbError> {
        self.query_all(query, params)?
            .into_iter()
            .next()
            .ok_or(DbError::NoRows)
    }

    /// Cheap reachability probe used by the upgrader's pre-flight check
    ///
    /// # Errors
    ///
    /// Returns `DbError` when the database does not respond.
    fn ping(&self) -> Result<(), DbError> {
        self.query_all("SELECT 1", &[]).map(|_| ())
    }

    fn begin(&self) -> Result<(), DbError> {
        self.execute("BEGIN TRANSACTION", &[]).map(|_| ())
    }

    fn commit(&self) -> Result<(), DbError> {
        self.execute("COMMIT", &[]).map(|_| ())
    }

    fn rollback(&self) -> Result<(), DbError> {
        self.execute("ROLLBACK", &[]).map(|_| ())
    }
}

impl<D: Database + ?Sized> Database for &D {
    fn provider_name(&self) -> &str {
        (**self).provider_name()
    }

    fn execute(&self, query: &str, params: &[Value]) -> Result<u64, DbError> {
        (**self).execute(query, params)
    }

    fn query_all(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        (**self).query_all(query, params)
    }

    fn query_one(&self, query: &str, params: &[Value]) -> Result<Row, DbError> {
        (**self).query_one(query, params)
    }

    fn ping(&self) -> Result<(), DbError> {
        (**self).ping()
    }

    fn begin(&self) -> Result<(), DbError> {
        (**self).begin()
    }

    fn commit(&self) -> Result<(), DbError> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<(), DbError> {
        (**self).rollback()
    }
}
