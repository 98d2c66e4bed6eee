//! Column type and option methods shared by every column-producing builder

use crate::database::Value;
use crate::schema::{Clustering, ColumnDefinition, DataType, DefaultValue, ForeignKeyDefinition, SystemMethod};

/// Fluent column grammar
///
/// Implementors expose the column currently being configured and decide what
/// a column-level foreign key turns into (an inline table constraint, or a
/// follow-up `create foreign key` expression).
pub trait ColumnSyntax: Sized {
    /// Apply `f` to the column being configured
    fn with_current(self, f: impl FnOnce(&mut ColumnDefinition)) -> Self;

    /// Attach a foreign key whose foreign side is the current column
    fn with_foreign_key(self, fk: ForeignKeyDefinition) -> Self;

    fn as_type(self, data_type: DataType) -> Self {
        self.with_current(|c| c.data_type = Some(data_type))
    }

    fn as_integer(self) -> Self {
        self.as_type(DataType::Integer)
    }

    fn as_int64(self) -> Self {
        self.as_type(DataType::BigInteger)
    }

    fn as_string(self) -> Self {
        self.as_type(DataType::String)
    }

    fn as_string_sized(self, size: u32) -> Self {
        self.with_current(|c| {
            c.data_type = Some(DataType::String);
            c.size = Some(size);
        })
    }

    /// Unbounded text
    fn as_text(self) -> Self {
        self.as_type(DataType::Text)
    }

    fn as_boolean(self) -> Self {
        self.as_type(DataType::Boolean)
    }

    fn as_date_time(self) -> Self {
        self.as_type(DataType::DateTime)
    }

    fn as_date_time_offset(self) -> Self {
        self.as_type(DataType::DateTimeOffset)
    }

    fn as_decimal(self) -> Self {
        self.as_type(DataType::Decimal)
    }

    fn as_decimal_sized(self, precision: u32, scale: u32) -> Self {
        self.with_current(|c| {
            c.data_type = Some(DataType::Decimal);
            c.size = Some(precision);
            c.precision = Some(scale);
        })
    }

    fn as_double(self) -> Self {
        self.as_type(DataType::Double)
    }

    fn as_binary(self) -> Self {
        self.as_type(DataType::Binary)
    }

    fn as_binary_sized(self, size: u32) -> Self {
        self.with_current(|c| {
            c.data_type = Some(DataType::Binary);
            c.size = Some(size);
        })
    }

    fn as_guid(self) -> Self {
        self.as_type(DataType::Guid)
    }

    /// Native type name, rendered verbatim on every dialect
    fn as_custom(self, native: impl Into<String>) -> Self {
        let native = native.into();
        self.as_type(DataType::Custom(native))
    }

    fn nullable(self) -> Self {
        self.with_current(|c| c.nullable = true)
    }

    fn not_nullable(self) -> Self {
        self.with_current(|c| c.nullable = false)
    }

    fn primary_key(self) -> Self {
        self.with_current(|c| c.is_primary_key = true)
    }

    fn primary_key_named(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with_current(|c| {
            c.is_primary_key = true;
            c.primary_key_name = Some(name);
        })
    }

    fn clustered(self) -> Self {
        self.with_current(|c| c.primary_key_clustering = Clustering::Clustered)
    }

    fn non_clustered(self) -> Self {
        self.with_current(|c| c.primary_key_clustering = Clustering::NonClustered)
    }

    fn identity(self) -> Self {
        self.with_current(|c| c.is_identity = true)
    }

    /// Back the column with a unique index `IX_{table}_{column}`
    fn unique(self) -> Self {
        self.with_current(|c| c.is_unique = true)
    }

    /// Back the column with a plain index `IX_{table}_{column}`
    fn indexed(self) -> Self {
        self.with_current(|c| c.is_indexed = true)
    }

    fn with_default(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.with_current(|c| c.default_value = Some(DefaultValue::Value(value)))
    }

    fn with_default_method(self, method: SystemMethod) -> Self {
        self.with_current(|c| c.default_value = Some(DefaultValue::Method(method)))
    }

    fn with_default_constraint_name(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with_current(|c| c.constraint_name = Some(name))
    }

    fn foreign_key(self, primary_table: impl Into<String>, primary_column: impl Into<String>) -> Self {
        self.with_foreign_key(ForeignKeyDefinition {
            primary_table: primary_table.into(),
            primary_columns: vec![primary_column.into()],
            ..Default::default()
        })
    }

    fn foreign_key_named(
        self,
        name: impl Into<String>,
        primary_table: impl Into<String>,
        primary_column: impl Into<String>,
    ) -> Self {
        self.with_foreign_key(ForeignKeyDefinition {
            name: Some(name.into()),
            primary_table: primary_table.into(),
            primary_columns: vec![primary_column.into()],
            ..Default::default()
        })
    }
}
