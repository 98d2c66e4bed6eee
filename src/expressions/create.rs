//! `create()` builders: tables, columns, indexes, foreign keys and constraints

use super::{ColumnSyntax, Expression, Target};
use crate::error::MigrationError;
use crate::schema::{
    Clustering, ColumnDefinition, ConstraintDefinition, ConstraintKind, Direction, ForeignKeyDefinition,
    IndexColumn, IndexDefinition, ReferentialAction, TableDefinition,
};

pub struct CreateBuilder<'a> {
    target: Target<'a>,
}

impl<'a> CreateBuilder<'a> {
    pub(crate) fn new(target: Target<'a>) -> Self {
        Self { target }
    }

    pub fn table(self, name: impl Into<String>) -> CreateTableBuilder<'a> {
        CreateTableBuilder {
            target: self.target,
            table: TableDefinition::new(name),
            stray_option: false,
        }
    }

    pub fn column(self, name: impl Into<String>) -> CreateColumnBuilder<'a> {
        CreateColumnBuilder::new(self.target, String::new(), name)
    }

    pub fn index(self) -> CreateIndexBuilder<'a> {
        CreateIndexBuilder {
            target: self.target,
            index: IndexDefinition::default(),
            stray_option: false,
        }
    }

    pub fn foreign_key(self) -> CreateForeignKeyBuilder<'a> {
        CreateForeignKeyBuilder {
            target: self.target,
            fk: ForeignKeyDefinition::default(),
        }
    }

    pub fn primary_key(self) -> CreateKeyConstraintBuilder<'a> {
        CreateKeyConstraintBuilder {
            target: self.target,
            constraint: ConstraintDefinition::new(ConstraintKind::PrimaryKey),
        }
    }

    pub fn unique_constraint(self) -> CreateKeyConstraintBuilder<'a> {
        CreateKeyConstraintBuilder {
            target: self.target,
            constraint: ConstraintDefinition::new(ConstraintKind::Unique),
        }
    }

    /// Named check constraint; finish with `.on_table(..).check(..)`
    pub fn constraint(self, name: impl Into<String>) -> CheckConstraintBuilder<'a> {
        let mut constraint = ConstraintDefinition::new(ConstraintKind::Check(String::new()));
        constraint.name = Some(name.into());
        CheckConstraintBuilder {
            target: self.target,
            constraint,
        }
    }
}

fn column_index(table: &str, column: &ColumnDefinition) -> Option<IndexDefinition> {
    if !(column.is_unique || column.is_indexed) {
        return None;
    }
    let mut index = IndexDefinition::new(table);
    index.unique = column.is_unique;
    index.columns.push(IndexColumn {
        name: column.name.clone(),
        direction: Direction::Ascending,
    });
    Some(index)
}

pub struct CreateTableBuilder<'a> {
    target: Target<'a>,
    table: TableDefinition,
    stray_option: bool,
}

impl<'a> CreateTableBuilder<'a> {
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.table.schema = Some(schema.into());
        self
    }

    /// Start a new column; following type/option calls apply to it
    pub fn with_column(mut self, name: impl Into<String>) -> Self {
        self.table.columns.push(ColumnDefinition::new(name));
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        if self.stray_option {
            return Err(MigrationError::invalid(
                "create table",
                "column option used before with_column()",
            ));
        }
        let mut table = self.table;
        let indexes: Vec<IndexDefinition> = table
            .columns
            .iter()
            .filter_map(|c| column_index(&table.name, c))
            .collect();
        table.indexes.extend(indexes);
        self.target.submit(Expression::CreateTable(table))
    }
}

impl ColumnSyntax for CreateTableBuilder<'_> {
    fn with_current(mut self, f: impl FnOnce(&mut ColumnDefinition)) -> Self {
        match self.table.columns.last_mut() {
            Some(column) => f(column),
            None => self.stray_option = true,
        }
        self
    }

    fn with_foreign_key(mut self, mut fk: ForeignKeyDefinition) -> Self {
        match self.table.columns.last() {
            Some(column) => {
                fk.foreign_columns = vec![column.name.clone()];
                self.table.foreign_keys.push(fk);
            }
            None => self.stray_option = true,
        }
        self
    }
}

/// Adds one column to an existing table, plus its index and foreign key if asked for
pub struct CreateColumnBuilder<'a> {
    target: Target<'a>,
    table: String,
    column: ColumnDefinition,
    foreign_key: Option<ForeignKeyDefinition>,
}

impl<'a> CreateColumnBuilder<'a> {
    pub(crate) fn new(target: Target<'a>, table: String, name: impl Into<String>) -> Self {
        Self {
            target,
            table,
            column: ColumnDefinition::new(name),
            foreign_key: None,
        }
    }

    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        let mut expressions = vec![Expression::CreateColumn {
            table: self.table.clone(),
            column: self.column.clone(),
        }];

        let mut column = self.column;
        column.inherit_table(&self.table);
        let owner = column.table().to_string();
        if let Some(index) = column_index(&owner, &column) {
            expressions.push(Expression::CreateIndex(index));
        }
        if let Some(mut fk) = self.foreign_key {
            fk.foreign_table = owner;
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

impl ColumnSyntax for CreateColumnBuilder<'_> {
    fn with_current(mut self, f: impl FnOnce(&mut ColumnDefinition)) -> Self {
        f(&mut self.column);
        self
    }

    fn with_foreign_key(mut self, fk: ForeignKeyDefinition) -> Self {
        self.foreign_key = Some(fk);
        self
    }
}

pub struct CreateIndexBuilder<'a> {
    target: Target<'a>,
    index: IndexDefinition,
    stray_option: bool,
}

impl CreateIndexBuilder<'_> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.index.name = Some(name.into());
        self
    }

    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.index.table_name = table.into();
        self
    }

    pub fn on_column(mut self, column: impl Into<String>) -> Self {
        self.index.columns.push(IndexColumn {
            name: column.into(),
            direction: Direction::Ascending,
        });
        self
    }

    fn direction(mut self, direction: Direction) -> Self {
        match self.index.columns.last_mut() {
            Some(column) => column.direction = direction,
            None => self.stray_option = true,
        }
        self
    }

    /// Sort order of the last column added
    pub fn ascending(self) -> Self {
        self.direction(Direction::Ascending)
    }

    pub fn descending(self) -> Self {
        self.direction(Direction::Descending)
    }

    pub fn unique(mut self) -> Self {
        self.index.unique = true;
        self
    }

    pub fn clustered(mut self) -> Self {
        self.index.clustering = Clustering::Clustered;
        self
    }

    pub fn non_clustered(mut self) -> Self {
        self.index.clustering = Clustering::NonClustered;
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        if self.stray_option {
            return Err(MigrationError::invalid(
                "create index",
                "sort order used before on_column()",
            ));
        }
        self.target.submit(Expression::CreateIndex(self.index))
    }
}

pub struct CreateForeignKeyBuilder<'a> {
    target: Target<'a>,
    fk: ForeignKeyDefinition,
}

impl CreateForeignKeyBuilder<'_> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.fk.name = Some(name.into());
        self
    }

    /// The referencing (child) table
    pub fn from_table(mut self, table: impl Into<String>) -> Self {
        self.fk.foreign_table = table.into();
        self
    }

    pub fn foreign_column(mut self, column: impl Into<String>) -> Self {
        self.fk.foreign_columns.push(column.into());
        self
    }

    pub fn foreign_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fk.foreign_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// The referenced (parent) table
    pub fn to_table(mut self, table: impl Into<String>) -> Self {
        self.fk.primary_table = table.into();
        self
    }

    pub fn primary_column(mut self, column: impl Into<String>) -> Self {
        self.fk.primary_columns.push(column.into());
        self
    }

    pub fn primary_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fk.primary_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.fk.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.fk.on_update = action;
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        self.target.submit(Expression::CreateForeignKey(self.fk))
    }
}

/// Primary key or unique constraint on an existing table
pub struct CreateKeyConstraintBuilder<'a> {
    target: Target<'a>,
    constraint: ConstraintDefinition,
}

impl CreateKeyConstraintBuilder<'_> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.constraint.name = Some(name.into());
        self
    }

    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.constraint.table_name = table.into();
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.constraint.columns.push(column.into());
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraint.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn clustered(mut self) -> Self {
        self.constraint.clustering = Clustering::Clustered;
        self
    }

    pub fn non_clustered(mut self) -> Self {
        self.constraint.clustering = Clustering::NonClustered;
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        self.target.submit(Expression::CreateConstraint(self.constraint))
    }
}

pub struct CheckConstraintBuilder<'a> {
    target: Target<'a>,
    constraint: ConstraintDefinition,
}

impl CheckConstraintBuilder<'_> {
    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.constraint.table_name = table.into();
        self
    }

    /// Boolean SQL expression the rows must satisfy
    pub fn check(mut self, expression: impl Into<String>) -> Self {
        self.constraint.kind = ConstraintKind::Check(expression.into());
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        self.target.submit(Expression::CreateConstraint(self.constraint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseProvider;
    use crate::expressions::testing::Recorder;
    use crate::schema::SystemMethod;

    #[test]
    fn test_create_column_renders_inherited_table() {
        let recorder = Recorder::new(DatabaseProvider::Postgres);
        CreateBuilder::new(recorder.target())
            .column("age")
            .on_table("person")
            .as_integer()
            .with_default(0)
            .exec()
            .unwrap();
        assert_eq!(
            recorder.sql(),
            vec!["ALTER TABLE \"person\" ADD COLUMN \"age\" INTEGER NOT NULL \
                  CONSTRAINT \"DF_person_age\" DEFAULT (0)"]
        );
    }

    #[test]
    fn test_create_column_without_table_is_invalid() {
        let recorder = Recorder::new(DatabaseProvider::Sqlite);
        let err = CreateBuilder::new(recorder.target())
            .column("age")
            .as_integer()
            .exec()
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidExpression { expression: "create column", .. }));
        assert!(recorder.sql().is_empty());
    }

    #[test]
    fn test_create_table_with_index_and_foreign_key() {
        let recorder = Recorder::new(DatabaseProvider::SqlServer);
        CreateBuilder::new(recorder.target())
            .table("post")
            .with_column("id").as_integer().primary_key().identity()
            .with_column("authorId").as_integer().foreign_key("person", "id")
            .with_column("slug").as_string_sized(64).unique()
            .with_column("created").as_date_time().with_default_method(SystemMethod::CurrentUtcDateTime)
            .exec()
            .unwrap();
        assert_eq!(
            recorder.sql(),
            vec![
                "CREATE TABLE [post] ([id] INT NOT NULL IDENTITY(1,1), \
                 [authorId] INT NOT NULL, \
                 [slug] NVARCHAR(64) NOT NULL, \
                 [created] DATETIME NOT NULL CONSTRAINT [DF_post_created] DEFAULT (GETUTCDATE()), \
                 CONSTRAINT [PK_post] PRIMARY KEY ([id]), \
                 CONSTRAINT [FK_post_person_id] FOREIGN KEY ([authorId]) REFERENCES [person] ([id]))",
                "CREATE UNIQUE INDEX [IX_post_slug] ON [post] ([slug])",
            ]
        );
    }

    #[test]
    fn test_create_table_rejects_duplicates_and_untyped_columns() {
        let recorder = Recorder::new(DatabaseProvider::Sqlite);
        let err = CreateBuilder::new(recorder.target())
            .table("Foo")
            .with_column("id").as_integer()
            .with_column("ID").as_text()
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("declared twice"));

        let err = CreateBuilder::new(recorder.target())
            .table("Foo")
            .with_column("id")
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("has no type"));
    }

    #[test]
    fn test_option_before_column_is_invalid() {
        let recorder = Recorder::new(DatabaseProvider::Sqlite);
        let err = CreateBuilder::new(recorder.target())
            .table("Foo")
            .as_integer()
            .with_column("id")
            .exec()
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidExpression { .. }));
    }

    #[test]
    fn test_identity_requires_integer() {
        let recorder = Recorder::new(DatabaseProvider::Postgres);
        let err = CreateBuilder::new(recorder.target())
            .table("Foo")
            .with_column("id").as_guid().primary_key().identity()
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("must be an integer type"));
    }

    #[test]
    fn test_create_index() {
        let recorder = Recorder::new(DatabaseProvider::Sqlite);
        CreateBuilder::new(recorder.target())
            .index()
            .named("IX_node_path")
            .on_table("node")
            .on_column("path")
            .on_column("level")
            .descending()
            .exec()
            .unwrap();
        assert_eq!(
            recorder.sql(),
            vec!["CREATE INDEX \"IX_node_path\" ON \"node\" (\"path\", \"level\" DESC)"]
        );
    }

    #[test]
    fn test_create_index_requires_columns() {
        let recorder = Recorder::new(DatabaseProvider::Sqlite);
        let err = CreateBuilder::new(recorder.target())
            .index()
            .on_table("node")
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("at least one column"));
    }

    #[test]
    fn test_sort_order_before_column_is_invalid() {
        let recorder = Recorder::new(DatabaseProvider::Sqlite);
        let err = CreateBuilder::new(recorder.target())
            .index()
            .on_table("node")
            .descending()
            .on_column("path")
            .exec()
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidExpression { .. }));
        assert!(err.to_string().contains("before on_column()"));
        assert!(recorder.sql().is_empty());
    }

    #[test]
    fn test_foreign_key_column_counts_must_match() {
        let recorder = Recorder::new(DatabaseProvider::Postgres);
        let err = CreateBuilder::new(recorder.target())
            .foreign_key()
            .from_table("post")
            .foreign_columns(["authorId", "authorKind"])
            .to_table("person")
            .primary_column("id")
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("2 foreign column(s) but 1 primary column(s)"));
    }

    #[test]
    fn test_foreign_key_with_cascade() {
        let recorder = Recorder::new(DatabaseProvider::Postgres);
        CreateBuilder::new(recorder.target())
            .foreign_key()
            .from_table("post")
            .foreign_column("authorId")
            .to_table("person")
            .primary_column("id")
            .on_delete(ReferentialAction::Cascade)
            .exec()
            .unwrap();
        assert_eq!(
            recorder.sql(),
            vec!["ALTER TABLE \"post\" ADD CONSTRAINT \"FK_post_person_id\" FOREIGN KEY (\"authorId\") \
                  REFERENCES \"person\" (\"id\") ON DELETE CASCADE"]
        );
    }

    #[test]
    fn test_create_column_with_foreign_key_emits_follow_up() {
        let recorder = Recorder::new(DatabaseProvider::Postgres);
        CreateBuilder::new(recorder.target())
            .column("parentId")
            .on_table("node")
            .as_integer()
            .nullable()
            .indexed()
            .foreign_key("node", "id")
            .exec()
            .unwrap();
        let sql = recorder.sql();
        assert_eq!(sql.len(), 3);
        assert_eq!(sql[1], "CREATE INDEX \"IX_node_parentId\" ON \"node\" (\"parentId\")");
        assert!(sql[2].starts_with("ALTER TABLE \"node\" ADD CONSTRAINT \"FK_node_node_id\""));
    }

    #[test]
    fn test_check_and_key_constraints() {
        let recorder = Recorder::new(DatabaseProvider::SqlServer);
        CreateBuilder::new(recorder.target())
            .constraint("CK_node_level")
            .on_table("node")
            .check("[level] >= 0")
            .exec()
            .unwrap();
        CreateBuilder::new(recorder.target())
            .primary_key()
            .on_table("node")
            .column("id")
            .clustered()
            .exec()
            .unwrap();
        assert_eq!(
            recorder.sql(),
            vec![
                "ALTER TABLE [node] ADD CONSTRAINT [CK_node_level] CHECK ([level] >= 0)",
                "ALTER TABLE [node] ADD CONSTRAINT [PK_node] PRIMARY KEY CLUSTERED ([id])",
            ]
        );
    }

    #[test]
    fn test_clustered_unique_on_sqlite_is_unsupported() {
        let recorder = Recorder::new(DatabaseProvider::Sqlite);
        let err = CreateBuilder::new(recorder.target())
            .unique_constraint()
            .on_table("node")
            .column("uniqueId")
            .clustered()
            .exec()
            .unwrap_err();
        assert!(matches!(err, MigrationError::Unsupported { .. }));
    }
}
