//! Migration state table management
//!
//! One row per plan: `(plan_name, state, updated_at)`. The store is a plain
//! key/value read and write; ordering and resumability live in the upgrader.

use crate::database::{Database, Value};
use crate::error::MigrationError;
use crate::expressions::Expression;
use crate::schema::{ColumnDefinition, DataType, TableDefinition};
use crate::syntax::SqlSyntaxProvider;
use chrono::Utc;

/// Length of the `plan_name` and `state` columns
pub const KEY_LENGTH: u32 = 255;

pub(crate) fn plan_name_column(syntax: &dyn SqlSyntaxProvider) -> ColumnDefinition {
    let mut column = ColumnDefinition::new("plan_name");
    column.data_type = Some(syntax.case_sensitive_string(KEY_LENGTH));
    column.size = Some(KEY_LENGTH);
    column
}

/// Reads and writes the persisted state of each plan
pub struct StateStore<'a> {
    db: &'a dyn Database,
    syntax: &'a dyn SqlSyntaxProvider,
    table: &'a str,
}

impl<'a> StateStore<'a> {
    pub fn new(db: &'a dyn Database, syntax: &'a dyn SqlSyntaxProvider, table: &'a str) -> Self {
        Self { db, syntax, table }
    }

    /// Definition of the state table for the dialect of `syntax`
    ///
    /// Plan names are keys and compare case-sensitively on every dialect.
    pub fn table_definition(syntax: &dyn SqlSyntaxProvider, table: &str) -> TableDefinition {
        let mut definition = TableDefinition::new(table);
        let mut plan_name = plan_name_column(syntax);
        plan_name.is_primary_key = true;
        let mut state = ColumnDefinition::new("state");
        state.data_type = Some(DataType::String);
        state.size = Some(KEY_LENGTH);
        let mut updated_at = ColumnDefinition::new("updated_at");
        updated_at.data_type = Some(DataType::DateTime);
        definition.columns = vec![plan_name, state, updated_at];
        definition
    }

    /// Create the state table unless it already exists
    ///
    /// # Errors
    ///
    /// Returns an error if introspection or the `CREATE TABLE` fails.
    pub fn ensure(&self) -> Result<(), MigrationError> {
        if self.syntax.table_exists(self.db, self.table)? {
            return Ok(());
        }
        log::info!("Creating migration state table {}", self.table);
        Expression::CreateTable(Self::table_definition(self.syntax, self.table)).execute(self.db, self.syntax)
    }

    pub fn exists(&self) -> Result<bool, MigrationError> {
        self.syntax.table_exists(self.db, self.table)
    }

    /// Current state of `plan`, or `None` if it has never been recorded
    pub fn get(&self, plan: &str) -> Result<Option<String>, MigrationError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            self.syntax.quoted_column_name("state"),
            self.syntax.quoted_table_name(self.table),
            self.syntax.quoted_column_name("plan_name"),
            self.syntax.parameter(1)
        );
        let rows = self.db.query_all(&sql, &[Value::from(plan)])?;
        match rows.first() {
            Some(row) => Ok(Some(row.get_str("state")?.to_string())),
            None => Ok(None),
        }
    }

    /// Record `state` for `plan`, replacing any previous value
    pub fn set(&self, plan: &str, state: &str) -> Result<(), MigrationError> {
        let now = Value::DateTime(Utc::now().naive_utc());
        let update = format!(
            "UPDATE {} SET {} = {}, {} = {} WHERE {} = {}",
            self.syntax.quoted_table_name(self.table),
            self.syntax.quoted_column_name("state"),
            self.syntax.parameter(1),
            self.syntax.quoted_column_name("updated_at"),
            self.syntax.parameter(2),
            self.syntax.quoted_column_name("plan_name"),
            self.syntax.parameter(3)
        );
        let updated = self
            .db
            .execute(&update, &[Value::from(state), now.clone(), Value::from(plan)])?;
        if updated == 0 {
            let insert = format!(
                "INSERT INTO {} ({}, {}, {}) VALUES ({}, {}, {})",
                self.syntax.quoted_table_name(self.table),
                self.syntax.quoted_column_name("plan_name"),
                self.syntax.quoted_column_name("state"),
                self.syntax.quoted_column_name("updated_at"),
                self.syntax.parameter(1),
                self.syntax.parameter(2),
                self.syntax.parameter(3)
            );
            self.db
                .execute(&insert, &[Value::from(plan), Value::from(state), now])?;
        }
        log::debug!("Persisted state '{}' for plan '{}'", state, plan);
        Ok(())
    }
}
