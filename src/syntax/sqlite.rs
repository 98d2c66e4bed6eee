//! SQLite dialect
//!
//! SQLite's `ALTER TABLE` only renames and adds/drops columns, so column
//! alteration, standalone foreign keys and most named constraints are
//! reported as unsupported. Unique constraints become unique indexes.
//! An identity column must also be the sole primary key and is rendered
//! inline as `PRIMARY KEY AUTOINCREMENT`.

use super::{ConstraintTarget, SqlSyntaxProvider, DEFAULT_DECIMAL_PRECISION, DEFAULT_DECIMAL_SCALE};
use crate::database::DatabaseProvider;
use crate::error::MigrationError;
use crate::schema::{
    ColumnDefinition, ConstraintDefinition, ConstraintKind, DataType, ForeignKeyDefinition,
    SystemMethod, TableDefinition,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSyntax;

impl SqliteSyntax {
    fn inline_identity_key(column: &ColumnDefinition) -> bool {
        column.is_identity && column.is_primary_key
    }
}

impl SqlSyntaxProvider for SqliteSyntax {
    fn provider(&self) -> DatabaseProvider {
        DatabaseProvider::Sqlite
    }

    fn parameter(&self, index: usize) -> String {
        format!("?{index}")
    }

    fn type_name(&self, column: &ColumnDefinition) -> Result<String, MigrationError> {
        let data_type = column
            .data_type
            .as_ref()
            .ok_or_else(|| MigrationError::invalid("column", format!("column '{}' has no type", column.name)))?;
        Ok(match data_type {
            DataType::Integer | DataType::BigInteger | DataType::Boolean => "INTEGER".into(),
            DataType::String | DataType::Text => "TEXT COLLATE NOCASE".into(),
            DataType::DateTime | DataType::DateTimeOffset | DataType::Guid => "TEXT".into(),
            DataType::Decimal => format!(
                "DECIMAL({},{})",
                column.size.unwrap_or(DEFAULT_DECIMAL_PRECISION),
                column.precision.unwrap_or(DEFAULT_DECIMAL_SCALE)
            ),
            DataType::Double => "REAL".into(),
            DataType::Binary => "BLOB".into(),
            DataType::Custom(native) => native.clone(),
        })
    }

    fn case_sensitive_string(&self, _size: u32) -> DataType {
        DataType::Custom("TEXT".into())
    }

    fn identity_clause(&self, column: &ColumnDefinition) -> Result<Option<String>, MigrationError> {
        if Self::inline_identity_key(column) {
            Ok(None)
        } else {
            Err(MigrationError::unsupported(
                self.provider(),
                format!("identity column '{}' outside the primary key", column.name),
            ))
        }
    }

    fn system_method(&self, method: SystemMethod) -> Result<String, MigrationError> {
        match method {
            SystemMethod::CurrentDateTime => Ok("datetime('now','localtime')".into()),
            SystemMethod::CurrentUtcDateTime => Ok("CURRENT_TIMESTAMP".into()),
            SystemMethod::NewGuid => Err(MigrationError::unsupported(
                self.provider(),
                "generated GUID defaults",
            )),
        }
    }

    fn column_primary_key_clause(
        &self,
        column: &ColumnDefinition,
    ) -> Result<Option<String>, MigrationError> {
        if Self::inline_identity_key(column) {
            Ok(Some("PRIMARY KEY AUTOINCREMENT".into()))
        } else {
            Ok(None)
        }
    }

    fn table_primary_key_clause(
        &self,
        table: &TableDefinition,
    ) -> Result<Option<String>, MigrationError> {
        let keys: Vec<&ColumnDefinition> = table.primary_key_columns().collect();
        match keys.as_slice() {
            [only] if Self::inline_identity_key(only) => {
                // Still reject an explicit clustering request.
                self.clustering_keyword(only.primary_key_clustering, "primary keys")?;
                Ok(None)
            }
            many if many.iter().any(|c| Self::inline_identity_key(c)) => {
                Err(MigrationError::unsupported(
                    self.provider(),
                    format!("identity column in the composite primary key of '{}'", table.name),
                ))
            }
            _ => {
                let columns: Vec<String> = keys.iter().map(|c| self.quoted_column_name(&c.name)).collect();
                if columns.is_empty() {
                    return Ok(None);
                }
                self.clustering_keyword(keys[0].primary_key_clustering, "primary keys")?;
                Ok(Some(format!(
                    "CONSTRAINT {} PRIMARY KEY ({})",
                    self.quoted_name(&table.primary_key_name()),
                    columns.join(", ")
                )))
            }
        }
    }

    fn format_alter_column(
        &self,
        _table: &str,
        column: &ColumnDefinition,
    ) -> Result<Vec<String>, MigrationError> {
        Err(MigrationError::unsupported(
            self.provider(),
            format!("altering column '{}'", column.name),
        ))
    }

    fn format_drop_default(&self, _table: &str, column: &str) -> Result<Vec<String>, MigrationError> {
        Err(MigrationError::unsupported(
            self.provider(),
            format!("dropping the default of column '{column}'"),
        ))
    }

    fn format_foreign_key(&self, fk: &ForeignKeyDefinition) -> Result<String, MigrationError> {
        Err(MigrationError::unsupported(
            self.provider(),
            format!("adding foreign key '{}' to an existing table", fk.resolved_name()),
        ))
    }

    fn format_constraint(&self, constraint: &ConstraintDefinition) -> Result<String, MigrationError> {
        match constraint.kind {
            ConstraintKind::Unique => {
                self.clustering_keyword(constraint.clustering, "constraints")?;
                Ok(format!(
                    "CREATE UNIQUE INDEX {} ON {} ({})",
                    self.quoted_name(&constraint.resolved_name()),
                    self.quoted_table_name(&constraint.table_name),
                    self.column_list(&constraint.columns)
                ))
            }
            ConstraintKind::PrimaryKey => Err(MigrationError::unsupported(
                self.provider(),
                "adding a primary key to an existing table",
            )),
            ConstraintKind::Check(_) => Err(MigrationError::unsupported(
                self.provider(),
                "adding a check constraint to an existing table",
            )),
        }
    }

    fn format_drop_constraint(
        &self,
        _table: &str,
        name: &str,
        target: ConstraintTarget,
    ) -> Result<String, MigrationError> {
        match target {
            ConstraintTarget::Unique => Ok(format!("DROP INDEX {}", self.quoted_name(name))),
            _ => Err(MigrationError::unsupported(
                self.provider(),
                format!("dropping constraint '{name}'"),
            )),
        }
    }

    fn format_insert_if_absent(&self, table: &str, columns: &[&str]) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.quoted_column_name(c)).collect();
        let params: Vec<String> = (1..=columns.len()).map(|i| self.parameter(i)).collect();
        format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            self.quoted_table_name(table),
            names.join(", "),
            params.join(", ")
        )
    }

    fn tables_query(&self) -> &'static str {
        "SELECT name AS table_name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'"
    }

    fn columns_query(&self) -> &'static str {
        "SELECT m.name AS table_name, p.name AS column_name \
         FROM sqlite_master m JOIN pragma_table_info(m.name) p \
         WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'"
    }

    fn indexes_query(&self) -> &'static str {
        "SELECT m.name AS table_name, il.name AS index_name, il.\"unique\" AS is_unique \
         FROM sqlite_master m JOIN pragma_index_list(m.name) il \
         WHERE m.type = 'table' AND il.origin = 'c'"
    }
}
