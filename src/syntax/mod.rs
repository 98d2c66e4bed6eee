//! SQL syntax providers: per-dialect rendering and schema introspection
//!
//! A [`SqlSyntaxProvider`] turns schema-model objects into dialect-correct SQL
//! and answers "does this table/column/index exist?" against a live database.
//! The trait carries the shared ANSI-ish rendering as default methods; each
//! dialect overrides quoting, type names, identity, clustering and whatever
//! statements it spells differently.
//!
//! Format methods are pure. Introspection methods issue read-only catalog
//! queries. Anything a dialect cannot express fails with
//! [`MigrationError::Unsupported`] instead of producing invalid SQL.

pub mod postgres;
pub mod sql_server;
pub mod sqlite;

pub use postgres::PostgresSyntax;
pub use sql_server::SqlServerSyntax;
pub use sqlite::SqliteSyntax;

use crate::database::{Database, DatabaseProvider, Value};
use crate::error::MigrationError;
use crate::schema::{
    Clustering, ColumnDefinition, ConstraintDefinition, ConstraintKind, DataType, DefaultValue, Direction,
    ForeignKeyDefinition, IndexDefinition, ReferentialAction, RowData, SystemMethod,
    TableDefinition,
};
use chrono::NaiveDateTime;
use std::collections::BTreeSet;

pub const DEFAULT_STRING_LENGTH: u32 = 255;
pub const DEFAULT_DECIMAL_PRECISION: u32 = 20;
pub const DEFAULT_DECIMAL_SCALE: u32 = 9;

/// A `(table, column)` pair reported by [`SqlSyntaxProvider::columns_in_schema`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnInfo {
    pub table_name: String,
    pub column_name: String,
}

/// An index reported by [`SqlSyntaxProvider::indexes_in_schema`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub table_name: String,
    pub index_name: String,
    pub unique: bool,
}

/// Which kind of constraint a drop-constraint expression targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintTarget {
    PrimaryKey,
    Unique,
    ForeignKey,
    Any,
}

/// Select the syntax provider for a dialect
pub fn syntax_for(provider: DatabaseProvider) -> Box<dyn SqlSyntaxProvider> {
    match provider {
        DatabaseProvider::SqlServer => Box::new(SqlServerSyntax),
        DatabaseProvider::Sqlite => Box::new(SqliteSyntax),
        DatabaseProvider::Postgres => Box::new(PostgresSyntax),
    }
}

/// Select the syntax provider from the database's reported provider name
///
/// # Errors
///
/// Returns `MigrationError::UnknownProvider` when the name matches no dialect.
pub fn syntax_for_database(db: &dyn Database) -> Result<Box<dyn SqlSyntaxProvider>, MigrationError> {
    let name = db.provider_name();
    let provider = name
        .parse::<DatabaseProvider>()
        .map_err(|_| MigrationError::UnknownProvider(name.to_string()))?;
    Ok(syntax_for(provider))
}

pub trait SqlSyntaxProvider: Send + Sync {
    fn provider(&self) -> DatabaseProvider;

    // ----- quoting and literals -------------------------------------------

    fn quoted_table_name(&self, name: &str) -> String {
        format!("\"{name}\"")
    }

    fn quoted_column_name(&self, name: &str) -> String {
        format!("\"{name}\"")
    }

    fn quoted_name(&self, name: &str) -> String {
        format!("\"{name}\"")
    }

    /// Table name with its schema prefix, if any
    fn qualified_table_name(&self, table: &TableDefinition) -> String {
        match &table.schema {
            Some(schema) if !schema.trim().is_empty() => {
                format!("{}.{}", self.quoted_name(schema), self.quoted_table_name(&table.name))
            }
            _ => self.quoted_table_name(&table.name),
        }
    }

    fn escape_string(&self, value: &str) -> String {
        value.replace('\'', "''")
    }

    fn quoted_string(&self, value: &str) -> String {
        format!("'{}'", self.escape_string(value))
    }

    /// Positional parameter placeholder, 1-based
    fn parameter(&self, index: usize) -> String;

    /// Date/time literal body; only used when values are inlined into SQL
    fn format_date_time(&self, value: &NaiveDateTime) -> String {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    fn format_bool(&self, value: bool) -> String {
        if value { "1" } else { "0" }.to_string()
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        format!("X'{}'", hex::encode_upper(bytes))
    }

    /// Literal for a text value
    fn format_text(&self, value: &str) -> String {
        self.quoted_string(value)
    }

    /// Render a value as an inline SQL literal
    fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.format_bool(*b),
            Value::Int(i) => i.to_string(),
            Value::Real(r) => r.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::Text(s) => self.format_text(s),
            Value::Bytes(b) => self.format_bytes(b),
            Value::Guid(g) => self.quoted_string(&g.to_string()),
            Value::DateTime(dt) => self.quoted_string(&self.format_date_time(dt)),
        }
    }

    // ----- capabilities ---------------------------------------------------

    fn supports_clustered(&self) -> bool {
        false
    }

    fn supports_identity_insert(&self) -> bool {
        false
    }

    /// Whether DDL statements take part in transactions
    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    /// Whether catalog names must match case exactly
    fn identifiers_case_sensitive(&self) -> bool {
        false
    }

    /// Keyword for a clustering hint, or `Unsupported` for `Clustered` on
    /// dialects without clustered storage
    fn clustering_keyword(
        &self,
        clustering: Clustering,
        what: &str,
    ) -> Result<Option<&'static str>, MigrationError> {
        match (clustering, self.supports_clustered()) {
            (Clustering::Default, _) => Ok(None),
            (Clustering::Clustered, true) => Ok(Some("CLUSTERED")),
            (Clustering::NonClustered, true) => Ok(Some("NONCLUSTERED")),
            (Clustering::NonClustered, false) => Ok(None),
            (Clustering::Clustered, false) => Err(MigrationError::unsupported(
                self.provider(),
                format!("clustered {what}"),
            )),
        }
    }

    // ----- columns --------------------------------------------------------

    /// Native type name for the column, including size/precision
    fn type_name(&self, column: &ColumnDefinition) -> Result<String, MigrationError>;

    /// Bounded string type that compares case-sensitively, for the engine's own key columns
    fn case_sensitive_string(&self, _size: u32) -> DataType {
        DataType::String
    }

    /// Identity/auto-increment clause, `None` when rendered elsewhere
    fn identity_clause(&self, column: &ColumnDefinition) -> Result<Option<String>, MigrationError>;

    fn system_method(&self, method: SystemMethod) -> Result<String, MigrationError>;

    fn format_default(&self, value: &DefaultValue) -> Result<String, MigrationError> {
        match value {
            DefaultValue::Value(v) => Ok(self.format_value(v)),
            DefaultValue::Method(m) => self.system_method(*m),
        }
    }

    /// Column-level primary key clause; dialects that inline the key override this
    fn column_primary_key_clause(
        &self,
        _column: &ColumnDefinition,
    ) -> Result<Option<String>, MigrationError> {
        Ok(None)
    }

    /// Render one column: name, type, nullability, default, primary key, identity
    fn format_column(&self, column: &ColumnDefinition) -> Result<String, MigrationError> {
        let mut clauses = vec![self.quoted_column_name(&column.name), self.type_name(column)?];
        clauses.push(if column.nullable { "NULL" } else { "NOT NULL" }.to_string());
        if let Some(default) = &column.default_value {
            clauses.push(format!(
                "CONSTRAINT {}",
                self.quoted_name(&column.default_constraint_name())
            ));
            clauses.push(format!("DEFAULT ({})", self.format_default(default)?));
        }
        if let Some(pk) = self.column_primary_key_clause(column)? {
            clauses.push(pk);
        }
        if column.is_identity {
            if let Some(identity) = self.identity_clause(column)? {
                clauses.push(identity);
            }
        }
        Ok(clauses.join(" "))
    }

    // ----- tables ---------------------------------------------------------

    /// Table-level primary key clause rendered inside `CREATE TABLE`
    fn table_primary_key_clause(
        &self,
        table: &TableDefinition,
    ) -> Result<Option<String>, MigrationError> {
        let columns: Vec<&ColumnDefinition> = table.primary_key_columns().collect();
        let Some(first) = columns.first() else {
            return Ok(None);
        };
        let clustering = self
            .clustering_keyword(first.primary_key_clustering, "primary keys")?
            .map(|k| format!(" {k}"))
            .unwrap_or_default();
        let names: Vec<String> = columns
            .iter()
            .map(|c| self.quoted_column_name(&c.name))
            .collect();
        Ok(Some(format!(
            "CONSTRAINT {} PRIMARY KEY{} ({})",
            self.quoted_name(&table.primary_key_name()),
            clustering,
            names.join(", ")
        )))
    }

    /// Inline `CONSTRAINT .. FOREIGN KEY` clause for `CREATE TABLE`
    fn inline_foreign_key_clause(&self, fk: &ForeignKeyDefinition) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}){}{}",
            self.quoted_name(&fk.resolved_name()),
            self.column_list(&fk.foreign_columns),
            self.quoted_table_name(&fk.primary_table),
            self.column_list(&fk.primary_columns),
            self.format_cascade("DELETE", fk.on_delete),
            self.format_cascade("UPDATE", fk.on_update),
        )
    }

    /// `CREATE TABLE` followed by the table's declared indexes
    fn format_table(&self, table: &TableDefinition) -> Result<Vec<String>, MigrationError> {
        let mut body = table
            .columns
            .iter()
            .map(|c| self.format_column(c))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(pk) = self.table_primary_key_clause(table)? {
            body.push(pk);
        }
        body.extend(table.foreign_keys.iter().map(|fk| self.inline_foreign_key_clause(fk)));

        let mut statements = vec![format!(
            "CREATE TABLE {} ({})",
            self.qualified_table_name(table),
            body.join(", ")
        )];
        for index in &table.indexes {
            statements.push(self.format_index(index)?);
        }
        Ok(statements)
    }

    fn format_drop_table(&self, name: &str) -> String {
        format!("DROP TABLE {}", self.quoted_table_name(name))
    }

    fn format_rename_table(&self, old_name: &str, new_name: &str) -> Result<String, MigrationError> {
        Ok(format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quoted_table_name(old_name),
            self.quoted_table_name(new_name)
        ))
    }

    fn format_add_column(&self, table: &str, column: &ColumnDefinition) -> Result<String, MigrationError> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quoted_table_name(table),
            self.format_column(column)?
        ))
    }

    /// Change type and nullability (and default, where given) of an existing column
    fn format_alter_column(
        &self,
        table: &str,
        column: &ColumnDefinition,
    ) -> Result<Vec<String>, MigrationError>;

    fn format_drop_column(&self, table: &str, column: &str) -> Result<String, MigrationError> {
        Ok(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quoted_table_name(table),
            self.quoted_column_name(column)
        ))
    }

    fn format_rename_column(
        &self,
        table: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<String, MigrationError> {
        Ok(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quoted_table_name(table),
            self.quoted_column_name(old_name),
            self.quoted_column_name(new_name)
        ))
    }

    /// Drop whatever default the column currently has
    fn format_drop_default(&self, table: &str, column: &str) -> Result<Vec<String>, MigrationError> {
        Ok(vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
            self.quoted_table_name(table),
            self.quoted_column_name(column)
        )])
    }

    // ----- indexes and constraints ----------------------------------------

    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quoted_column_name(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn format_index(&self, index: &IndexDefinition) -> Result<String, MigrationError> {
        let mut kind = String::new();
        if index.unique {
            kind.push_str("UNIQUE ");
        }
        if let Some(k) = self.clustering_keyword(index.clustering, "indexes")? {
            kind.push_str(k);
            kind.push(' ');
        }
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| match c.direction {
                Direction::Ascending => self.quoted_column_name(&c.name),
                Direction::Descending => format!("{} DESC", self.quoted_column_name(&c.name)),
            })
            .collect();
        Ok(format!(
            "CREATE {}INDEX {} ON {} ({})",
            kind,
            self.quoted_name(&index.resolved_name()),
            self.quoted_table_name(&index.table_name),
            columns.join(", ")
        ))
    }

    fn format_drop_index(&self, _table: &str, index: &str) -> Result<String, MigrationError> {
        Ok(format!("DROP INDEX {}", self.quoted_name(index)))
    }

    fn format_cascade(&self, on_what: &str, action: ReferentialAction) -> String {
        let action = match action {
            ReferentialAction::None => return String::new(),
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        };
        format!(" ON {on_what} {action}")
    }

    fn format_foreign_key(&self, fk: &ForeignKeyDefinition) -> Result<String, MigrationError> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.quoted_table_name(&fk.foreign_table),
            self.inline_foreign_key_clause(fk)
        ))
    }

    fn format_constraint(&self, constraint: &ConstraintDefinition) -> Result<String, MigrationError> {
        let body = match &constraint.kind {
            ConstraintKind::PrimaryKey | ConstraintKind::Unique => {
                let keyword = if constraint.kind == ConstraintKind::PrimaryKey {
                    "PRIMARY KEY"
                } else {
                    "UNIQUE"
                };
                let clustering = self
                    .clustering_keyword(constraint.clustering, "constraints")?
                    .map(|k| format!(" {k}"))
                    .unwrap_or_default();
                format!("{keyword}{clustering} ({})", self.column_list(&constraint.columns))
            }
            ConstraintKind::Check(expression) => format!("CHECK ({expression})"),
        };
        Ok(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {}",
            self.quoted_table_name(&constraint.table_name),
            self.quoted_name(&constraint.resolved_name()),
            body
        ))
    }

    fn format_drop_constraint(
        &self,
        table: &str,
        name: &str,
        _target: ConstraintTarget,
    ) -> Result<String, MigrationError> {
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quoted_table_name(table),
            self.quoted_name(name)
        ))
    }

    // ----- data -----------------------------------------------------------

    /// `a = 1 AND b IS NULL`
    fn format_where(&self, filter: &RowData) -> String {
        filter
            .iter()
            .map(|(column, value)| match value {
                Value::Null => format!("{} IS NULL", self.quoted_column_name(column)),
                v => format!("{} = {}", self.quoted_column_name(column), self.format_value(v)),
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn format_insert(&self, table: &str, row: &RowData) -> String {
        let columns: Vec<String> = row.columns().map(|c| self.quoted_column_name(c)).collect();
        let values: Vec<String> = row.values().map(|v| self.format_value(v)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quoted_table_name(table),
            columns.join(", "),
            values.join(", ")
        )
    }

    fn format_update(&self, table: &str, set: &RowData, filter: Option<&RowData>) -> String {
        let assignments: Vec<String> = set
            .iter()
            .map(|(c, v)| format!("{} = {}", self.quoted_column_name(c), self.format_value(v)))
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.quoted_table_name(table),
            assignments.join(", ")
        );
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(&self.format_where(filter));
        }
        sql
    }

    fn format_delete(&self, table: &str, filter: Option<&RowData>) -> String {
        let mut sql = format!("DELETE FROM {}", self.quoted_table_name(table));
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(&self.format_where(filter));
        }
        sql
    }

    /// `SET IDENTITY_INSERT` toggle on dialects that need it
    fn format_identity_insert(&self, _table: &str, _enabled: bool) -> Option<String> {
        None
    }

    /// Parameterised insert that silently does nothing when a row with the same
    /// first column already exists. Affects one row when it inserted.
    fn format_insert_if_absent(&self, table: &str, columns: &[&str]) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.quoted_column_name(c)).collect();
        let params: Vec<String> = (1..=columns.len()).map(|i| self.parameter(i)).collect();
        let key = names.first().cloned().unwrap_or_default();
        format!(
            "INSERT INTO {t} ({}) SELECT {} WHERE NOT EXISTS (SELECT 1 FROM {t} WHERE {key} = {})",
            names.join(", "),
            params.join(", "),
            self.parameter(1),
            t = self.quoted_table_name(table),
        )
    }

    // ----- introspection --------------------------------------------------

    /// Query returning one `table_name` column per user table
    fn tables_query(&self) -> &'static str;

    /// Query returning `table_name`, `column_name` for every user column
    fn columns_query(&self) -> &'static str;

    /// Query returning `table_name`, `index_name`, `is_unique` for secondary indexes
    fn indexes_query(&self) -> &'static str;

    fn tables_in_schema(&self, db: &dyn Database) -> Result<BTreeSet<String>, MigrationError> {
        let rows = db.query_all(self.tables_query(), &[])?;
        rows.iter()
            .map(|r| Ok(r.get_str("table_name")?.to_string()))
            .collect()
    }

    fn columns_in_schema(&self, db: &dyn Database) -> Result<BTreeSet<ColumnInfo>, MigrationError> {
        let rows = db.query_all(self.columns_query(), &[])?;
        rows.iter()
            .map(|r| {
                Ok(ColumnInfo {
                    table_name: r.get_str("table_name")?.to_string(),
                    column_name: r.get_str("column_name")?.to_string(),
                })
            })
            .collect()
    }

    fn indexes_in_schema(&self, db: &dyn Database) -> Result<Vec<IndexInfo>, MigrationError> {
        let rows = db.query_all(self.indexes_query(), &[])?;
        rows.iter()
            .map(|r| {
                Ok(IndexInfo {
                    table_name: r.get_str("table_name")?.to_string(),
                    index_name: r.get_str("index_name")?.to_string(),
                    unique: r.get("is_unique").and_then(Value::as_bool).unwrap_or(false),
                })
            })
            .collect()
    }

    fn names_match(&self, a: &str, b: &str) -> bool {
        if self.identifiers_case_sensitive() {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }

    fn table_exists(&self, db: &dyn Database, table: &str) -> Result<bool, MigrationError> {
        Ok(self
            .tables_in_schema(db)?
            .iter()
            .any(|t| self.names_match(t, table)))
    }

    fn column_exists(&self, db: &dyn Database, table: &str, column: &str) -> Result<bool, MigrationError> {
        Ok(self
            .columns_in_schema(db)?
            .iter()
            .any(|c| self.names_match(&c.table_name, table) && self.names_match(&c.column_name, column)))
    }

    fn index_exists(&self, db: &dyn Database, index: &str) -> Result<bool, MigrationError> {
        Ok(self
            .indexes_in_schema(db)?
            .iter()
            .any(|i| self.names_match(&i.index_name, index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_for_selects_dialect() {
        for provider in [
            DatabaseProvider::SqlServer,
            DatabaseProvider::Sqlite,
            DatabaseProvider::Postgres,
        ] {
            assert_eq!(syntax_for(provider).provider(), provider);
        }
    }

    #[test]
    fn test_format_where_renders_nulls() {
        let syntax = SqliteSyntax;
        let filter = crate::row! { "parentId" => -1, "trashed" => Value::Null };
        assert_eq!(
            syntax.format_where(&filter),
            "\"parentId\" = -1 AND \"trashed\" IS NULL"
        );
    }

    #[test]
    fn test_quoted_string_escapes() {
        let syntax = PostgresSyntax;
        assert_eq!(syntax.format_value(&Value::from("O'Brien")), "'O''Brien'");
    }

    #[test]
    fn test_clustering_keyword() {
        assert_eq!(
            SqlServerSyntax.clustering_keyword(Clustering::Clustered, "indexes").unwrap(),
            Some("CLUSTERED")
        );
        assert_eq!(
            SqliteSyntax.clustering_keyword(Clustering::NonClustered, "indexes").unwrap(),
            None
        );
        let err = SqliteSyntax
            .clustering_keyword(Clustering::Clustered, "indexes")
            .unwrap_err();
        assert!(matches!(err, MigrationError::Unsupported { .. }));
    }
}
