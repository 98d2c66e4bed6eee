//! SQL Server dialect

use super::{SqlSyntaxProvider, DEFAULT_DECIMAL_PRECISION, DEFAULT_DECIMAL_SCALE, DEFAULT_STRING_LENGTH};
use crate::database::DatabaseProvider;
use crate::error::MigrationError;
use crate::schema::{ColumnDefinition, DataType, ReferentialAction, SystemMethod};
use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerSyntax;

impl SqlServerSyntax {
    /// T-SQL string literal, safe to embed inside dynamic SQL
    fn literal(&self, value: &str) -> String {
        format!("N{}", self.quoted_string(value))
    }
}

impl SqlSyntaxProvider for SqlServerSyntax {
    fn provider(&self) -> DatabaseProvider {
        DatabaseProvider::SqlServer
    }

    fn quoted_table_name(&self, name: &str) -> String {
        format!("[{name}]")
    }

    fn quoted_column_name(&self, name: &str) -> String {
        format!("[{name}]")
    }

    fn quoted_name(&self, name: &str) -> String {
        format!("[{name}]")
    }

    fn parameter(&self, index: usize) -> String {
        format!("@p{index}")
    }

    fn format_date_time(&self, value: &NaiveDateTime) -> String {
        value.format("%Y%m%d %H:%M:%S").to_string()
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        format!("0x{}", hex::encode_upper(bytes))
    }

    /// Unicode literal; a plain '..' literal is narrowed to the database code page
    fn format_text(&self, value: &str) -> String {
        self.literal(value)
    }

    fn supports_clustered(&self) -> bool {
        true
    }

    fn supports_identity_insert(&self) -> bool {
        true
    }

    fn case_sensitive_string(&self, size: u32) -> DataType {
        DataType::Custom(format!("NVARCHAR({size}) COLLATE Latin1_General_BIN2"))
    }

    fn type_name(&self, column: &ColumnDefinition) -> Result<String, MigrationError> {
        let data_type = column
            .data_type
            .as_ref()
            .ok_or_else(|| MigrationError::invalid("column", format!("column '{}' has no type", column.name)))?;
        Ok(match data_type {
            DataType::Integer => "INT".into(),
            DataType::BigInteger => "BIGINT".into(),
            DataType::String => format!("NVARCHAR({})", column.size.unwrap_or(DEFAULT_STRING_LENGTH)),
            DataType::Text => "NVARCHAR(MAX)".into(),
            DataType::Boolean => "BIT".into(),
            DataType::DateTime => "DATETIME".into(),
            DataType::DateTimeOffset => "DATETIMEOFFSET(7)".into(),
            DataType::Decimal => format!(
                "DECIMAL({},{})",
                column.size.unwrap_or(DEFAULT_DECIMAL_PRECISION),
                column.precision.unwrap_or(DEFAULT_DECIMAL_SCALE)
            ),
            DataType::Double => "FLOAT".into(),
            DataType::Binary => match column.size {
                Some(size) => format!("VARBINARY({size})"),
                None => "VARBINARY(MAX)".into(),
            },
            DataType::Guid => "UNIQUEIDENTIFIER".into(),
            DataType::Custom(native) => native.clone(),
        })
    }

    fn identity_clause(&self, _column: &ColumnDefinition) -> Result<Option<String>, MigrationError> {
        Ok(Some("IDENTITY(1,1)".into()))
    }

    fn system_method(&self, method: SystemMethod) -> Result<String, MigrationError> {
        Ok(match method {
            SystemMethod::CurrentDateTime => "GETDATE()",
            SystemMethod::CurrentUtcDateTime => "GETUTCDATE()",
            SystemMethod::NewGuid => "NEWID()",
        }
        .into())
    }

    fn format_cascade(&self, on_what: &str, action: ReferentialAction) -> String {
        let action = match action {
            ReferentialAction::None => return String::new(),
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::Restrict => "NO ACTION",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        };
        format!(" ON {on_what} {action}")
    }

    fn format_rename_table(&self, old_name: &str, new_name: &str) -> Result<String, MigrationError> {
        Ok(format!(
            "EXEC sp_rename {}, {}",
            self.literal(old_name),
            self.literal(new_name)
        ))
    }

    fn format_add_column(&self, table: &str, column: &ColumnDefinition) -> Result<String, MigrationError> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.quoted_table_name(table),
            self.format_column(column)?
        ))
    }

    fn format_alter_column(
        &self,
        table: &str,
        column: &ColumnDefinition,
    ) -> Result<Vec<String>, MigrationError> {
        let mut statements = vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} {} {}",
            self.quoted_table_name(table),
            self.quoted_column_name(&column.name),
            self.type_name(column)?,
            if column.nullable { "NULL" } else { "NOT NULL" }
        )];
        if let Some(default) = &column.default_value {
            statements.extend(self.format_drop_default(table, &column.name)?);
            statements.push(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT ({}) FOR {}",
                self.quoted_table_name(table),
                self.quoted_name(&column.default_constraint_name()),
                self.format_default(default)?,
                self.quoted_column_name(&column.name)
            ));
        }
        Ok(statements)
    }

    fn format_rename_column(
        &self,
        table: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<String, MigrationError> {
        Ok(format!(
            "EXEC sp_rename {}, {}, 'COLUMN'",
            self.literal(&format!("{table}.{old_name}")),
            self.literal(new_name)
        ))
    }

    /// Default constraints are named objects; look the name up and drop it
    fn format_drop_default(&self, table: &str, column: &str) -> Result<Vec<String>, MigrationError> {
        Ok(vec![format!(
            "DECLARE @df sysname; \
             SELECT @df = dc.name FROM sys.default_constraints dc \
             JOIN sys.columns c ON c.object_id = dc.parent_object_id AND c.column_id = dc.parent_column_id \
             WHERE dc.parent_object_id = OBJECT_ID({}) AND c.name = {}; \
             IF @df IS NOT NULL EXEC('ALTER TABLE {} DROP CONSTRAINT [' + @df + ']')",
            self.literal(table),
            self.literal(column),
            self.escape_string(&self.quoted_table_name(table))
        )])
    }

    fn format_drop_index(&self, table: &str, index: &str) -> Result<String, MigrationError> {
        Ok(format!(
            "DROP INDEX {} ON {}",
            self.quoted_name(index),
            self.quoted_table_name(table)
        ))
    }

    fn format_identity_insert(&self, table: &str, enabled: bool) -> Option<String> {
        Some(format!(
            "SET IDENTITY_INSERT {} {}",
            self.quoted_table_name(table),
            if enabled { "ON" } else { "OFF" }
        ))
    }

    fn format_insert_if_absent(&self, table: &str, columns: &[&str]) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.quoted_column_name(c)).collect();
        let params: Vec<String> = (1..=columns.len()).map(|i| self.parameter(i)).collect();
        let key = names.first().cloned().unwrap_or_default();
        format!(
            "INSERT INTO {t} ({}) SELECT {} WHERE NOT EXISTS \
             (SELECT 1 FROM {t} WITH (UPDLOCK, HOLDLOCK) WHERE {key} = {})",
            names.join(", "),
            params.join(", "),
            self.parameter(1),
            t = self.quoted_table_name(table),
        )
    }

    fn tables_query(&self) -> &'static str {
        "SELECT TABLE_NAME AS table_name FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE'"
    }

    fn columns_query(&self) -> &'static str {
        "SELECT TABLE_NAME AS table_name, COLUMN_NAME AS column_name FROM INFORMATION_SCHEMA.COLUMNS"
    }

    fn indexes_query(&self) -> &'static str {
        "SELECT t.name AS table_name, i.name AS index_name, i.is_unique AS is_unique \
         FROM sys.indexes i JOIN sys.tables t ON i.object_id = t.object_id \
         WHERE i.name IS NOT NULL AND i.is_primary_key = 0 AND i.is_unique_constraint = 0"
    }
}
