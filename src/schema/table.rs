//! Table definition metadata

use super::{ColumnDefinition, ForeignKeyDefinition, IndexDefinition};

/// A table as described by a create-table expression
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableDefinition {
    pub name: String,
    /// Optional schema/namespace (e.g. `dbo`)
    pub schema: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    /// Foreign keys declared inline on columns, rendered inside `CREATE TABLE`
    pub foreign_keys: Vec<ForeignKeyDefinition>,
    /// Indexes declared with `indexed()`/`unique()`, created after the table
    pub indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }

    /// Name of the primary key constraint: the first explicit name, else `PK_{table}`
    pub fn primary_key_name(&self) -> String {
        self.primary_key_columns()
            .find_map(|c| c.primary_key_name.clone())
            .unwrap_or_else(|| format!("PK_{}", self.name))
    }

    /// Push the table name down to every column that does not name one
    pub fn resolve_columns(&mut self) {
        let name = self.name.clone();
        for column in &mut self.columns {
            column.inherit_table(&name);
        }
        for index in &mut self.indexes {
            if index.table_name.trim().is_empty() {
                index.table_name = name.clone();
            }
        }
        for fk in &mut self.foreign_keys {
            if fk.foreign_table.trim().is_empty() {
                fk.foreign_table = name.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_name_defaults_to_table() {
        let mut table = TableDefinition::new("Foo");
        let mut id = ColumnDefinition::new("id");
        id.is_primary_key = true;
        table.columns.push(id);
        assert_eq!(table.primary_key_name(), "PK_Foo");

        table.columns[0].primary_key_name = Some("PK_custom".into());
        assert_eq!(table.primary_key_name(), "PK_custom");
    }

    #[test]
    fn test_resolve_columns_keeps_explicit_tables() {
        let mut table = TableDefinition::new("Foo");
        table.columns.push(ColumnDefinition::new("a"));
        let mut b = ColumnDefinition::new("b");
        b.table_name = Some("Elsewhere".into());
        table.columns.push(b);

        table.resolve_columns();
        assert_eq!(table.columns[0].table(), "Foo");
        assert_eq!(table.columns[1].table(), "Elsewhere");
    }
}
