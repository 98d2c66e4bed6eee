//! Column definition metadata

use crate::database::Value;

/// Dialect-neutral column type
///
/// Each syntax provider maps these to its native type names, e.g. `Integer`
/// renders as `INT` on SQL Server and `INTEGER` on SQLite and PostgreSQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Integer,
    BigInteger,
    /// Bounded string; `size` defaults to 255
    String,
    /// Unbounded string
    Text,
    Boolean,
    DateTime,
    DateTimeOffset,
    /// `size` is the precision (default 20), `precision` the scale (default 9)
    Decimal,
    Double,
    Binary,
    Guid,
    /// Rendered verbatim
    Custom(String),
}

impl DataType {
    pub fn is_integral(&self) -> bool {
        matches!(self, DataType::Integer | DataType::BigInteger)
    }
}

/// Database-side functions usable as column defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMethod {
    CurrentDateTime,
    CurrentUtcDateTime,
    NewGuid,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Value(Value),
    Method(SystemMethod),
}

/// What an expression does to the column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModificationKind {
    #[default]
    Create,
    Alter,
    Delete,
}

/// Clustering hint for primary keys, unique constraints and indexes.
///
/// `Default` lets the dialect decide. `Clustered` fails on dialects without
/// clustered storage; `NonClustered` is what those dialects do anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clustering {
    #[default]
    Default,
    Clustered,
    NonClustered,
}

/// Column definition metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    /// Owning table; inherited from the enclosing expression when unset
    pub table_name: Option<String>,
    pub data_type: Option<DataType>,
    pub nullable: bool,
    pub default_value: Option<DefaultValue>,
    /// Length for strings/binary, precision for decimals
    pub size: Option<u32>,
    /// Scale for decimals
    pub precision: Option<u32>,
    pub is_primary_key: bool,
    pub primary_key_name: Option<String>,
    pub primary_key_clustering: Clustering,
    pub is_identity: bool,
    pub is_unique: bool,
    pub is_indexed: bool,
    /// Name of the default constraint; `DF_{table}_{column}` when unset
    pub constraint_name: Option<String>,
    pub modification: ModificationKind,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            data_type: None,
            nullable: false,
            default_value: None,
            size: None,
            precision: None,
            is_primary_key: false,
            primary_key_name: None,
            primary_key_clustering: Clustering::Default,
            is_identity: false,
            is_unique: false,
            is_indexed: false,
            constraint_name: None,
            modification: ModificationKind::Create,
        }
    }

    /// Fill in the owning table if this column does not name one already
    pub fn inherit_table(&mut self, table: &str) {
        let blank = self.table_name.as_deref().map_or(true, |t| t.trim().is_empty());
        if blank {
            self.table_name = Some(table.to_string());
        }
    }

    pub fn table(&self) -> &str {
        self.table_name.as_deref().unwrap_or_default()
    }

    pub fn default_constraint_name(&self) -> String {
        self.constraint_name
            .clone()
            .unwrap_or_else(|| format!("DF_{}_{}", self.table(), self.name))
    }
}
