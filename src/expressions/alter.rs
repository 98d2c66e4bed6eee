//! `alter()` and `rename()` builders

use super::create::CreateColumnBuilder;
use super::{ColumnSyntax, Expression, Target};
use crate::error::MigrationError;
use crate::schema::{ColumnDefinition, ForeignKeyDefinition, IndexColumn, IndexDefinition, ModificationKind};

pub struct AlterBuilder<'a> {
    target: Target<'a>,
}

impl<'a> AlterBuilder<'a> {
    pub(crate) fn new(target: Target<'a>) -> Self {
        Self { target }
    }

    pub fn table(self, name: impl Into<String>) -> AlterTableBuilder<'a> {
        AlterTableBuilder {
            target: self.target,
            table: name.into(),
        }
    }

    /// Alter a column; name its table with `.on_table(..)`
    pub fn column(self, name: impl Into<String>) -> AlterColumnBuilder<'a> {
        AlterColumnBuilder::new(self.target, String::new(), name)
    }
}

pub struct AlterTableBuilder<'a> {
    target: Target<'a>,
    table: String,
}

impl<'a> AlterTableBuilder<'a> {
    pub fn add_column(self, name: impl Into<String>) -> CreateColumnBuilder<'a> {
        CreateColumnBuilder::new(self.target, self.table, name)
    }

    pub fn alter_column(self, name: impl Into<String>) -> AlterColumnBuilder<'a> {
        AlterColumnBuilder::new(self.target, self.table, name)
    }
}

/// Changes type, nullability and default of an existing column.
/// The full new definition is required; unset fields are not read back.
pub struct AlterColumnBuilder<'a> {
    target: Target<'a>,
    table: String,
    column: ColumnDefinition,
    foreign_key: Option<ForeignKeyDefinition>,
}

impl<'a> AlterColumnBuilder<'a> {
    fn new(target: Target<'a>, table: String, name: impl Into<String>) -> Self {
        let mut column = ColumnDefinition::new(name);
        column.modification = ModificationKind::Alter;
        Self {
            target,
            table,
            column,
            foreign_key: None,
        }
    }

    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        let mut expressions = vec![Expression::AlterColumn {
            table: self.table.clone(),
            column: self.column.clone(),
        }];

        let mut column = self.column;
        column.inherit_table(&self.table);
        if column.is_unique || column.is_indexed {
            let mut index = IndexDefinition::new(column.table());
            index.unique = column.is_unique;
            index.columns.push(IndexColumn {
                name: column.name.clone(),
                direction: Default::default(),
            });
            expressions.push(Expression::CreateIndex(index));
        }
        if let Some(mut fk) = self.foreign_key {
            fk.foreign_table = column.table().to_string();
            fk.foreign_columns = vec![column.name.clone()];
            expressions.push(Expression::CreateForeignKey(fk));
        }

        for expression in &expressions {
            expression.validate()?;
        }
        expressions
            .into_iter()
            .try_for_each(|expression| self.target.submit(expression))
    }
}

impl ColumnSyntax for AlterColumnBuilder<'_> {
    fn with_current(mut self, f: impl FnOnce(&mut ColumnDefinition)) -> Self {
        f(&mut self.column);
        self
    }

    fn with_foreign_key(mut self, fk: ForeignKeyDefinition) -> Self {
        self.foreign_key = Some(fk);
        self
    }
}

pub struct RenameBuilder<'a> {
    target: Target<'a>,
}

impl<'a> RenameBuilder<'a> {
    pub(crate) fn new(target: Target<'a>) -> Self {
        Self { target }
    }

    pub fn table(self, old_name: impl Into<String>) -> RenameTableBuilder<'a> {
        RenameTableBuilder {
            target: self.target,
            old_name: old_name.into(),
            new_name: String::new(),
        }
    }

    pub fn column(self, old_name: impl Into<String>) -> RenameColumnBuilder<'a> {
        RenameColumnBuilder {
            target: self.target,
            table: String::new(),
            old_name: old_name.into(),
            new_name: String::new(),
        }
    }
}

pub struct RenameTableBuilder<'a> {
    target: Target<'a>,
    old_name: String,
    new_name: String,
}

impl RenameTableBuilder<'_> {
    pub fn to(mut self, new_name: impl Into<String>) -> Self {
        self.new_name = new_name.into();
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        self.target.submit(Expression::RenameTable {
            old_name: self.old_name,
            new_name: self.new_name,
        })
    }
}

pub struct RenameColumnBuilder<'a> {
    target: Target<'a>,
    table: String,
    old_name: String,
    new_name: String,
}

impl RenameColumnBuilder<'_> {
    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn to(mut self, new_name: impl Into<String>) -> Self {
        self.new_name = new_name.into();
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        self.target.submit(Expression::RenameColumn {
            table: self.table,
            old_name: self.old_name,
            new_name: self.new_name,
        })
    }
}
