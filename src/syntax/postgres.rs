//! PostgreSQL dialect

use super::{SqlSyntaxProvider, DEFAULT_DECIMAL_PRECISION, DEFAULT_DECIMAL_SCALE, DEFAULT_STRING_LENGTH};
use crate::database::DatabaseProvider;
use crate::error::MigrationError;
use crate::schema::{ColumnDefinition, DataType, SystemMethod};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresSyntax;

impl SqlSyntaxProvider for PostgresSyntax {
    fn provider(&self) -> DatabaseProvider {
        DatabaseProvider::Postgres
    }

    fn parameter(&self, index: usize) -> String {
        format!("${index}")
    }

    fn format_bool(&self, value: bool) -> String {
        if value { "TRUE" } else { "FALSE" }.to_string()
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        format!("'\\x{}'", hex::encode(bytes))
    }

    fn identifiers_case_sensitive(&self) -> bool {
        true
    }

    fn type_name(&self, column: &ColumnDefinition) -> Result<String, MigrationError> {
        let data_type = column
            .data_type
            .as_ref()
            .ok_or_else(|| MigrationError::invalid("column", format!("column '{}' has no type", column.name)))?;
        Ok(match data_type {
            DataType::Integer => "INTEGER".into(),
            DataType::BigInteger => "BIGINT".into(),
            DataType::String => format!("VARCHAR({})", column.size.unwrap_or(DEFAULT_STRING_LENGTH)),
            DataType::Text => "TEXT".into(),
            DataType::Boolean => "BOOLEAN".into(),
            DataType::DateTime => "TIMESTAMP".into(),
            DataType::DateTimeOffset => "TIMESTAMPTZ".into(),
            DataType::Decimal => format!(
                "NUMERIC({},{})",
                column.size.unwrap_or(DEFAULT_DECIMAL_PRECISION),
                column.precision.unwrap_or(DEFAULT_DECIMAL_SCALE)
            ),
            DataType::Double => "DOUBLE PRECISION".into(),
            DataType::Binary => "BYTEA".into(),
            DataType::Guid => "UUID".into(),
            DataType::Custom(native) => native.clone(),
        })
    }

    fn identity_clause(&self, _column: &ColumnDefinition) -> Result<Option<String>, MigrationError> {
        Ok(Some("GENERATED BY DEFAULT AS IDENTITY".into()))
    }

    fn system_method(&self, method: SystemMethod) -> Result<String, MigrationError> {
        Ok(match method {
            SystemMethod::CurrentDateTime => "CURRENT_TIMESTAMP",
            SystemMethod::CurrentUtcDateTime => "(CURRENT_TIMESTAMP AT TIME ZONE 'UTC')",
            SystemMethod::NewGuid => "gen_random_uuid()",
        }
        .into())
    }

    fn format_alter_column(
        &self,
        table: &str,
        column: &ColumnDefinition,
    ) -> Result<Vec<String>, MigrationError> {
        let name = self.quoted_column_name(&column.name);
        let mut actions = vec![
            format!("ALTER COLUMN {name} TYPE {}", self.type_name(column)?),
            format!(
                "ALTER COLUMN {name} {} NOT NULL",
                if column.nullable { "DROP" } else { "SET" }
            ),
        ];
        if let Some(default) = &column.default_value {
            actions.push(format!(
                "ALTER COLUMN {name} SET DEFAULT {}",
                self.format_default(default)?
            ));
        }
        Ok(vec![format!(
            "ALTER TABLE {} {}",
            self.quoted_table_name(table),
            actions.join(", ")
        )])
    }

    fn format_insert_if_absent(&self, table: &str, columns: &[&str]) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.quoted_column_name(c)).collect();
        let params: Vec<String> = (1..=columns.len()).map(|i| self.parameter(i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
            self.quoted_table_name(table),
            names.join(", "),
            params.join(", ")
        )
    }

    fn tables_query(&self) -> &'static str {
        "SELECT table_name::text AS table_name FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'"
    }

    fn columns_query(&self) -> &'static str {
        "SELECT table_name::text AS table_name, column_name::text AS column_name \
         FROM information_schema.columns WHERE table_schema = current_schema()"
    }

    fn indexes_query(&self) -> &'static str {
        "SELECT i.tablename::text AS table_name, i.indexname::text AS index_name, \
         i.indexdef LIKE 'CREATE UNIQUE%' AS is_unique \
         FROM pg_indexes i WHERE i.schemaname = current_schema() \
         AND NOT EXISTS (SELECT 1 FROM pg_constraint c WHERE c.conname = i.indexname)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Value;
    use crate::schema::{DefaultValue, TableDefinition};

    fn column(name: &str, data_type: DataType) -> ColumnDefinition {
        let mut col = ColumnDefinition::new(name);
        col.data_type = Some(data_type);
        col.inherit_table("person");
        col
    }

    #[test]
    fn test_format_column_with_default() {
        let mut age = column("age", DataType::Integer);
        age.default_value = Some(DefaultValue::Value(Value::Int(0)));
        assert_eq!(
            PostgresSyntax.format_column(&age).unwrap(),
            "\"age\" INTEGER NOT NULL CONSTRAINT \"DF_person_age\" DEFAULT (0)"
        );
    }

    #[test]
    fn test_identity_and_key() {
        let mut table = TableDefinition::new("Foo");
        let mut id = column("id", DataType::BigInteger);
        id.is_primary_key = true;
        id.is_identity = true;
        table.columns = vec![id];
        assert_eq!(
            PostgresSyntax.format_table(&table).unwrap(),
            vec!["CREATE TABLE \"Foo\" (\"id\" BIGINT NOT NULL GENERATED BY DEFAULT AS IDENTITY, \
                  CONSTRAINT \"PK_Foo\" PRIMARY KEY (\"id\"))"
                .to_string()]
        );
    }

    #[test]
    fn test_alter_column_sets_type_and_nullability() {
        let mut col = column("email", DataType::String);
        col.size = Some(320);
        col.nullable = true;
        assert_eq!(
            PostgresSyntax.format_alter_column("person", &col).unwrap(),
            vec!["ALTER TABLE \"person\" ALTER COLUMN \"email\" TYPE VARCHAR(320), \
                  ALTER COLUMN \"email\" DROP NOT NULL"
                .to_string()]
        );
    }

    #[test]
    fn test_system_methods_and_literals() {
        assert_eq!(PostgresSyntax.system_method(SystemMethod::NewGuid).unwrap(), "gen_random_uuid()");
        assert_eq!(PostgresSyntax.format_value(&Value::Bool(false)), "FALSE");
        assert_eq!(PostgresSyntax.format_value(&Value::Bytes(vec![0xde, 0xad])), "'\\xdead'");
        assert_eq!(PostgresSyntax.parameter(2), "$2");
    }

    #[test]
    fn test_drop_default() {
        assert_eq!(
            PostgresSyntax.format_drop_default("person", "age").unwrap(),
            vec!["ALTER TABLE \"person\" ALTER COLUMN \"age\" DROP DEFAULT".to_string()]
        );
    }
}
