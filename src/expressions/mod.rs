//! Expressions and the fluent builders that produce them
//!
//! A builder collects one DDL/DML intent and, at its terminal `.exec()`,
//! materializes an [`Expression`]. The expression is validated before any SQL
//! is rendered, so authoring mistakes surface as
//! [`MigrationError::InvalidExpression`] without touching the database.
//! The runner (normally a [`MigrationContext`](crate::migration::MigrationContext))
//! then executes the rendered SQL, or records it in dry-run mode.
//!
//! ```no_run
//! # use tidemark::migration::MigrationContext;
//! # use tidemark::expressions::ColumnSyntax;
//! # fn step(ctx: &MigrationContext<'_>) -> Result<(), tidemark::MigrationError> {
//! ctx.create()
//!     .table("person")
//!     .with_column("id").as_integer().primary_key().identity()
//!     .with_column("name").as_string_sized(100)
//!     .exec()?;
//!
//! ctx.create().column("age").on_table("person").as_integer().with_default(0).exec()?;
//! # Ok(())
//! # }
//! ```

pub mod alter;
pub mod column;
pub mod create;
pub mod data;
pub mod delete;
pub mod execute;

pub use alter::{AlterBuilder, AlterColumnBuilder, AlterTableBuilder, RenameBuilder, RenameColumnBuilder, RenameTableBuilder};
pub use column::ColumnSyntax;
pub use create::{
    CheckConstraintBuilder, CreateBuilder, CreateColumnBuilder, CreateForeignKeyBuilder,
    CreateIndexBuilder, CreateKeyConstraintBuilder, CreateTableBuilder,
};
pub use data::{InsertBuilder, UpdateBuilder, UpdateTableBuilder};
pub use delete::{
    DeleteBuilder, DeleteColumnBuilder, DeleteConstraintBuilder, DeleteDataBuilder,
    DeleteDefaultConstraintBuilder, DeleteIndexBuilder, DeleteTableBuilder,
};
pub use execute::ExecuteBuilder;

use crate::database::{Database, DatabaseProvider};
use crate::error::MigrationError;
use crate::schema::{
    check_identifier, ColumnDefinition, ConstraintDefinition, ConstraintKind,
    ForeignKeyDefinition, IndexDefinition, RowData, TableDefinition,
};
use crate::syntax::{ConstraintTarget, SqlSyntaxProvider};
use std::collections::HashSet;

/// One materialized DDL/DML intent
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    CreateTable(TableDefinition),
    /// Add a column; the column inherits `table` when it names none itself
    CreateColumn { table: String, column: ColumnDefinition },
    AlterColumn { table: String, column: ColumnDefinition },
    CreateIndex(IndexDefinition),
    CreateForeignKey(ForeignKeyDefinition),
    CreateConstraint(ConstraintDefinition),
    RenameTable { old_name: String, new_name: String },
    RenameColumn { table: String, old_name: String, new_name: String },
    DeleteTable { table: String },
    DeleteColumns { table: String, columns: Vec<String> },
    DeleteIndex { table: String, name: String },
    DeleteForeignKey { table: String, name: String },
    DeleteConstraint { table: String, name: String, target: ConstraintTarget },
    DeleteDefaultConstraint { table: String, column: String },
    Insert { table: String, rows: Vec<RowData>, identity_insert: bool },
    Update { table: String, set: RowData, filter: Option<RowData>, all_rows: bool },
    DeleteData { table: String, rows: Vec<RowData>, all_rows: bool },
    Execute { sql: String },
}

impl Expression {
    /// Short human-readable kind, used in errors and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Expression::CreateTable(_) => "create table",
            Expression::CreateColumn { .. } => "create column",
            Expression::AlterColumn { .. } => "alter column",
            Expression::CreateIndex(_) => "create index",
            Expression::CreateForeignKey(_) => "create foreign key",
            Expression::CreateConstraint(_) => "create constraint",
            Expression::RenameTable { .. } => "rename table",
            Expression::RenameColumn { .. } => "rename column",
            Expression::DeleteTable { .. } => "delete table",
            Expression::DeleteColumns { .. } => "delete column",
            Expression::DeleteIndex { .. } => "delete index",
            Expression::DeleteForeignKey { .. } => "delete foreign key",
            Expression::DeleteConstraint { .. } => "delete constraint",
            Expression::DeleteDefaultConstraint { .. } => "delete default constraint",
            Expression::Insert { .. } => "insert",
            Expression::Update { .. } => "update",
            Expression::DeleteData { .. } => "delete data",
            Expression::Execute { .. } => "execute",
        }
    }

    /// Resolve inherited names; `validate` and `to_sql` call this themselves
    fn resolved(&self) -> Expression {
        let mut expression = self.clone();
        match &mut expression {
            Expression::CreateTable(table) => table.resolve_columns(),
            Expression::CreateColumn { table, column } | Expression::AlterColumn { table, column } => {
                column.inherit_table(table);
            }
            _ => {}
        }
        expression
    }

    /// Check that every required field is present and well formed
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidExpression` naming the expression kind and
    /// the first problem found.
    pub fn validate(&self) -> Result<(), MigrationError> {
        let kind = self.kind();
        match &self.resolved() {
            Expression::CreateTable(table) => validate_table(kind, table),
            Expression::CreateColumn { column, .. } => {
                check_identifier(kind, "table name", column.table())?;
                validate_column(kind, column)?;
                if column.is_primary_key {
                    return Err(MigrationError::invalid(
                        kind,
                        format!("column '{}' cannot become a primary key when added; create a primary key constraint instead", column.name),
                    ));
                }
                Ok(())
            }
            Expression::AlterColumn { column, .. } => {
                check_identifier(kind, "table name", column.table())?;
                validate_column(kind, column)?;
                if column.is_identity || column.is_primary_key {
                    return Err(MigrationError::invalid(
                        kind,
                        format!("identity and primary key of column '{}' cannot be altered", column.name),
                    ));
                }
                Ok(())
            }
            Expression::CreateIndex(index) => validate_index(kind, index),
            Expression::CreateForeignKey(fk) => validate_foreign_key(kind, fk),
            Expression::CreateConstraint(constraint) => {
                check_identifier(kind, "table name", &constraint.table_name)?;
                if let Some(name) = &constraint.name {
                    check_identifier(kind, "constraint name", name)?;
                }
                match &constraint.kind {
                    ConstraintKind::Check(sql) if sql.trim().is_empty() => {
                        Err(MigrationError::invalid(kind, "check expression is required"))
                    }
                    ConstraintKind::Check(_) => Ok(()),
                    _ if constraint.columns.is_empty() => {
                        Err(MigrationError::invalid(kind, "at least one column is required"))
                    }
                    _ => constraint
                        .columns
                        .iter()
                        .try_for_each(|c| check_identifier(kind, "column name", c)),
                }
            }
            Expression::RenameTable { old_name, new_name } => {
                check_identifier(kind, "table name", old_name)?;
                check_identifier(kind, "new table name", new_name)
            }
            Expression::RenameColumn { table, old_name, new_name } => {
                check_identifier(kind, "table name", table)?;
                check_identifier(kind, "column name", old_name)?;
                check_identifier(kind, "new column name", new_name)
            }
            Expression::DeleteTable { table } => check_identifier(kind, "table name", table),
            Expression::DeleteColumns { table, columns } => {
                check_identifier(kind, "table name", table)?;
                if columns.is_empty() {
                    return Err(MigrationError::invalid(kind, "at least one column is required"));
                }
                columns
                    .iter()
                    .try_for_each(|c| check_identifier(kind, "column name", c))
            }
            Expression::DeleteIndex { table, name }
            | Expression::DeleteForeignKey { table, name }
            | Expression::DeleteConstraint { table, name, .. } => {
                check_identifier(kind, "table name", table)?;
                check_identifier(kind, "name", name)
            }
            Expression::DeleteDefaultConstraint { table, column } => {
                check_identifier(kind, "table name", table)?;
                check_identifier(kind, "column name", column)
            }
            Expression::Insert { table, rows, .. } => {
                check_identifier(kind, "table name", table)?;
                if rows.is_empty() {
                    return Err(MigrationError::invalid(kind, "at least one row is required"));
                }
                rows.iter().try_for_each(|row| validate_row(kind, row))
            }
            Expression::Update { table, set, filter, all_rows } => {
                check_identifier(kind, "table name", table)?;
                if set.is_empty() {
                    return Err(MigrationError::invalid(kind, "at least one column to set is required"));
                }
                validate_row(kind, set)?;
                match (filter, all_rows) {
                    (None, false) => Err(MigrationError::invalid(
                        kind,
                        "a filter or all_rows() is required",
                    )),
                    (Some(_), true) => Err(MigrationError::invalid(
                        kind,
                        "a filter and all_rows() are mutually exclusive",
                    )),
                    (Some(filter), false) => validate_row(kind, filter),
                    (None, true) => Ok(()),
                }
            }
            Expression::DeleteData { table, rows, all_rows } => {
                check_identifier(kind, "table name", table)?;
                match (rows.is_empty(), all_rows) {
                    (true, false) => Err(MigrationError::invalid(
                        kind,
                        "a row, is_null() or all_rows() is required",
                    )),
                    (false, true) => Err(MigrationError::invalid(
                        kind,
                        "row filters and all_rows() are mutually exclusive",
                    )),
                    _ => rows.iter().try_for_each(|row| validate_row(kind, row)),
                }
            }
            Expression::Execute { sql } => {
                if sql.trim().is_empty() {
                    Err(MigrationError::invalid(kind, "SQL text is required"))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Validate and render for the given dialect
    ///
    /// # Errors
    ///
    /// Returns `InvalidExpression` for malformed expressions and `Unsupported`
    /// when the dialect cannot express the operation.
    pub fn to_sql(&self, syntax: &dyn SqlSyntaxProvider) -> Result<Vec<String>, MigrationError> {
        self.validate()?;
        let statements = match self.resolved() {
            Expression::CreateTable(table) => syntax.format_table(&table)?,
            Expression::CreateColumn { column, .. } => {
                vec![syntax.format_add_column(column.table(), &column)?]
            }
            Expression::AlterColumn { column, .. } => syntax.format_alter_column(column.table(), &column)?,
            Expression::CreateIndex(index) => vec![syntax.format_index(&index)?],
            Expression::CreateForeignKey(fk) => vec![syntax.format_foreign_key(&fk)?],
            Expression::CreateConstraint(constraint) => vec![syntax.format_constraint(&constraint)?],
            Expression::RenameTable { old_name, new_name } => {
                vec![syntax.format_rename_table(&old_name, &new_name)?]
            }
            Expression::RenameColumn { table, old_name, new_name } => {
                vec![syntax.format_rename_column(&table, &old_name, &new_name)?]
            }
            Expression::DeleteTable { table } => vec![syntax.format_drop_table(&table)],
            Expression::DeleteColumns { table, columns } => columns
                .iter()
                .map(|c| syntax.format_drop_column(&table, c))
                .collect::<Result<Vec<_>, _>>()?,
            Expression::DeleteIndex { table, name } => vec![syntax.format_drop_index(&table, &name)?],
            Expression::DeleteForeignKey { table, name } => {
                vec![syntax.format_drop_constraint(&table, &name, ConstraintTarget::ForeignKey)?]
            }
            Expression::DeleteConstraint { table, name, target } => {
                vec![syntax.format_drop_constraint(&table, &name, target)?]
            }
            Expression::DeleteDefaultConstraint { table, column } => {
                syntax.format_drop_default(&table, &column)?
            }
            Expression::Insert { table, rows, identity_insert } => {
                let toggle = identity_insert && syntax.supports_identity_insert();
                let mut statements = Vec::with_capacity(rows.len() + 2);
                if toggle {
                    statements.extend(syntax.format_identity_insert(&table, true));
                }
                statements.extend(rows.iter().map(|row| syntax.format_insert(&table, row)));
                if toggle {
                    statements.extend(syntax.format_identity_insert(&table, false));
                }
                statements
            }
            Expression::Update { table, set, filter, .. } => {
                vec![syntax.format_update(&table, &set, filter.as_ref())]
            }
            Expression::DeleteData { table, rows, all_rows } => {
                if all_rows {
                    vec![syntax.format_delete(&table, None)]
                } else {
                    rows.iter()
                        .map(|row| syntax.format_delete(&table, Some(row)))
                        .collect()
                }
            }
            Expression::Execute { sql } => vec![sql],
        };
        Ok(statements)
    }

    /// Render and run every statement against `db`
    ///
    /// # Errors
    ///
    /// Returns the first validation, rendering or database error.
    pub fn execute(&self, db: &dyn Database, syntax: &dyn SqlSyntaxProvider) -> Result<(), MigrationError> {
        for statement in self.to_sql(syntax)? {
            log::debug!("{}", statement);
            db.execute(&statement, &[])?;
        }
        Ok(())
    }
}

fn validate_column(kind: &'static str, column: &ColumnDefinition) -> Result<(), MigrationError> {
    check_identifier(kind, "column name", &column.name)?;
    let Some(data_type) = &column.data_type else {
        return Err(MigrationError::invalid(
            kind,
            format!("column '{}' has no type", column.name),
        ));
    };
    if column.is_identity && !data_type.is_integral() {
        return Err(MigrationError::invalid(
            kind,
            format!("identity column '{}' must be an integer type", column.name),
        ));
    }
    if let Some(name) = &column.constraint_name {
        check_identifier(kind, "default constraint name", name)?;
    }
    Ok(())
}

fn validate_table(kind: &'static str, table: &TableDefinition) -> Result<(), MigrationError> {
    check_identifier(kind, "table name", &table.name)?;
    if table.columns.is_empty() {
        return Err(MigrationError::invalid(
            kind,
            format!("table '{}' has no columns", table.name),
        ));
    }
    let mut seen = HashSet::new();
    for column in &table.columns {
        validate_column(kind, column)?;
        if !seen.insert(column.name.to_ascii_lowercase()) {
            return Err(MigrationError::invalid(
                kind,
                format!("column '{}' is declared twice", column.name),
            ));
        }
    }
    table.indexes.iter().try_for_each(|i| validate_index(kind, i))?;
    table.foreign_keys.iter().try_for_each(|fk| validate_foreign_key(kind, fk))
}

fn validate_index(kind: &'static str, index: &IndexDefinition) -> Result<(), MigrationError> {
    check_identifier(kind, "table name", &index.table_name)?;
    if let Some(name) = &index.name {
        check_identifier(kind, "index name", name)?;
    }
    if index.columns.is_empty() {
        return Err(MigrationError::invalid(kind, "at least one column is required"));
    }
    index
        .columns
        .iter()
        .try_for_each(|c| check_identifier(kind, "column name", &c.name))
}

fn validate_foreign_key(kind: &'static str, fk: &ForeignKeyDefinition) -> Result<(), MigrationError> {
    check_identifier(kind, "foreign table", &fk.foreign_table)?;
    check_identifier(kind, "primary table", &fk.primary_table)?;
    if let Some(name) = &fk.name {
        check_identifier(kind, "foreign key name", name)?;
    }
    if fk.foreign_columns.is_empty() || fk.primary_columns.is_empty() {
        return Err(MigrationError::invalid(kind, "foreign and primary columns are required"));
    }
    if fk.foreign_columns.len() != fk.primary_columns.len() {
        return Err(MigrationError::invalid(
            kind,
            format!(
                "{} foreign column(s) but {} primary column(s)",
                fk.foreign_columns.len(),
                fk.primary_columns.len()
            ),
        ));
    }
    fk.foreign_columns
        .iter()
        .chain(&fk.primary_columns)
        .try_for_each(|c| check_identifier(kind, "column name", c))
}

fn validate_row(kind: &'static str, row: &RowData) -> Result<(), MigrationError> {
    if row.is_empty() {
        return Err(MigrationError::invalid(kind, "rows must name at least one column"));
    }
    row.columns()
        .try_for_each(|c| check_identifier(kind, "column name", c))
}

/// Something that can run a materialized expression
pub trait ExpressionRunner {
    fn syntax(&self) -> &dyn SqlSyntaxProvider;

    /// Execute (or, in dry-run mode, capture) the expression
    fn run(&self, expression: Expression) -> Result<(), MigrationError>;
}

/// Where a builder sends its expression, and whether it is gated off
#[derive(Clone, Copy)]
pub struct Target<'a> {
    runner: &'a dyn ExpressionRunner,
    enabled: bool,
}

impl<'a> Target<'a> {
    pub fn new(runner: &'a dyn ExpressionRunner) -> Self {
        Self { runner, enabled: true }
    }

    /// Only run expressions when the runner's dialect is one of `providers`
    pub fn gated(runner: &'a dyn ExpressionRunner, providers: &[DatabaseProvider]) -> Self {
        let active = runner.syntax().provider();
        Self {
            runner,
            enabled: providers.contains(&active),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Validate, then run unless gated off
    pub(crate) fn submit(&self, expression: Expression) -> Result<(), MigrationError> {
        expression.validate()?;
        if !self.enabled {
            log::debug!(
                "Skipping {} expression: not enabled for {}",
                expression.kind(),
                self.runner.syntax().provider()
            );
            return Ok(());
        }
        self.runner.run(expression)
    }
}

/// Builders scoped to a set of providers; everything built through it is a
/// no-op on other dialects
pub struct IfDatabaseBuilder<'a> {
    target: Target<'a>,
}

impl<'a> IfDatabaseBuilder<'a> {
    pub(crate) fn new(target: Target<'a>) -> Self {
        Self { target }
    }

    pub fn create(&self) -> CreateBuilder<'a> {
        CreateBuilder::new(self.target)
    }

    pub fn alter(&self) -> AlterBuilder<'a> {
        AlterBuilder::new(self.target)
    }

    pub fn delete(&self) -> DeleteBuilder<'a> {
        DeleteBuilder::new(self.target)
    }

    pub fn rename(&self) -> RenameBuilder<'a> {
        RenameBuilder::new(self.target)
    }

    pub fn insert(&self) -> InsertBuilder<'a> {
        InsertBuilder::new(self.target)
    }

    pub fn update(&self) -> UpdateBuilder<'a> {
        UpdateBuilder::new(self.target)
    }

    pub fn execute(&self) -> ExecuteBuilder<'a> {
        ExecuteBuilder::new(self.target)
    }
}
