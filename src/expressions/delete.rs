//! `delete()` builders

use super::{Expression, Target};
use crate::database::Value;
use crate::error::MigrationError;
use crate::schema::RowData;
use crate::syntax::ConstraintTarget;

pub struct DeleteBuilder<'a> {
    target: Target<'a>,
}

impl<'a> DeleteBuilder<'a> {
    pub(crate) fn new(target: Target<'a>) -> Self {
        Self { target }
    }

    pub fn table(self, name: impl Into<String>) -> DeleteTableBuilder<'a> {
        DeleteTableBuilder {
            target: self.target,
            table: name.into(),
        }
    }

    pub fn column(self, name: impl Into<String>) -> DeleteColumnBuilder<'a> {
        DeleteColumnBuilder {
            target: self.target,
            table: String::new(),
            columns: vec![name.into()],
        }
    }

    pub fn index(self, name: impl Into<String>) -> DeleteIndexBuilder<'a> {
        DeleteIndexBuilder {
            target: self.target,
            table: String::new(),
            name: name.into(),
        }
    }

    pub fn foreign_key(self, name: impl Into<String>) -> DeleteConstraintBuilder<'a> {
        self.constraint_of(name, ConstraintTarget::ForeignKey)
    }

    pub fn primary_key(self, name: impl Into<String>) -> DeleteConstraintBuilder<'a> {
        self.constraint_of(name, ConstraintTarget::PrimaryKey)
    }

    pub fn unique_constraint(self, name: impl Into<String>) -> DeleteConstraintBuilder<'a> {
        self.constraint_of(name, ConstraintTarget::Unique)
    }

    pub fn constraint(self, name: impl Into<String>) -> DeleteConstraintBuilder<'a> {
        self.constraint_of(name, ConstraintTarget::Any)
    }

    fn constraint_of(self, name: impl Into<String>, kind: ConstraintTarget) -> DeleteConstraintBuilder<'a> {
        DeleteConstraintBuilder {
            target: self.target,
            table: String::new(),
            name: name.into(),
            kind,
        }
    }

    /// Drop the default of a column, whatever its constraint is called
    pub fn default_constraint(self) -> DeleteDefaultConstraintBuilder<'a> {
        DeleteDefaultConstraintBuilder {
            target: self.target,
            table: String::new(),
            column: String::new(),
        }
    }

    pub fn data(self) -> DeleteDataBuilder<'a> {
        DeleteDataBuilder {
            target: self.target,
            table: String::new(),
            rows: Vec::new(),
            all_rows: false,
        }
    }
}

pub struct DeleteTableBuilder<'a> {
    target: Target<'a>,
    table: String,
}

impl DeleteTableBuilder<'_> {
    pub fn exec(self) -> Result<(), MigrationError> {
        self.target.submit(Expression::DeleteTable { table: self.table })
    }
}

pub struct DeleteColumnBuilder<'a> {
    target: Target<'a>,
    table: String,
    columns: Vec<String>,
}

impl DeleteColumnBuilder<'_> {
    /// Drop another column from the same table
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }

    pub fn from_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        self.target.submit(Expression::DeleteColumns {
            table: self.table,
            columns: self.columns,
        })
    }
}

/// Dropping an index only needs its name and table
pub struct DeleteIndexBuilder<'a> {
    target: Target<'a>,
    table: String,
    name: String,
}

impl DeleteIndexBuilder<'_> {
    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        self.target.submit(Expression::DeleteIndex {
            table: self.table,
            name: self.name,
        })
    }
}

pub struct DeleteConstraintBuilder<'a> {
    target: Target<'a>,
    table: String,
    name: String,
    kind: ConstraintTarget,
}

impl DeleteConstraintBuilder<'_> {
    pub fn from_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn on_table(self, table: impl Into<String>) -> Self {
        self.from_table(table)
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        let expression = match self.kind {
            ConstraintTarget::ForeignKey => Expression::DeleteForeignKey {
                table: self.table,
                name: self.name,
            },
            target => Expression::DeleteConstraint {
                table: self.table,
                name: self.name,
                target,
            },
        };
        self.target.submit(expression)
    }
}

pub struct DeleteDefaultConstraintBuilder<'a> {
    target: Target<'a>,
    table: String,
    column: String,
}

impl DeleteDefaultConstraintBuilder<'_> {
    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn on_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        self.target.submit(Expression::DeleteDefaultConstraint {
            table: self.table,
            column: self.column,
        })
    }
}

/// Deletes rows matching each `row(..)` filter, or every row with `all_rows()`
pub struct DeleteDataBuilder<'a> {
    target: Target<'a>,
    table: String,
    rows: Vec<RowData>,
    all_rows: bool,
}

impl DeleteDataBuilder<'_> {
    pub fn from_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Delete rows whose columns equal every value in `filter`
    pub fn row(mut self, filter: RowData) -> Self {
        self.rows.push(filter);
        self
    }

    /// Delete rows where `column` is null
    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.rows.push(RowData::new().with(column, Value::Null));
        self
    }

    pub fn all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        self.target.submit(Expression::DeleteData {
            table: self.table,
            rows: self.rows,
            all_rows: self.all_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseProvider;
    use crate::expressions::testing::Recorder;
    use crate::row;

    #[test]
    fn test_delete_table_and_columns() {
        let recorder = Recorder::new(DatabaseProvider::Sqlite);
        DeleteBuilder::new(recorder.target()).table("legacy").exec().unwrap();
        DeleteBuilder::new(recorder.target())
            .column("a")
            .column("b")
            .from_table("person")
            .exec()
            .unwrap();
        assert_eq!(
            recorder.sql(),
            vec![
                "DROP TABLE \"legacy\"",
                "ALTER TABLE \"person\" DROP COLUMN \"a\"",
                "ALTER TABLE \"person\" DROP COLUMN \"b\"",
            ]
        );
    }

    #[test]
    fn test_delete_index_per_dialect() {
        let recorder = Recorder::new(DatabaseProvider::SqlServer);
        DeleteBuilder::new(recorder.target())
            .index("IX_person_email")
            .on_table("person")
            .exec()
            .unwrap();
        let postgres = Recorder::new(DatabaseProvider::Postgres);
        DeleteBuilder::new(postgres.target())
            .index("IX_person_email")
            .on_table("person")
            .exec()
            .unwrap();
        assert_eq!(recorder.sql(), vec!["DROP INDEX [IX_person_email] ON [person]"]);
        assert_eq!(postgres.sql(), vec!["DROP INDEX \"IX_person_email\""]);
    }

    #[test]
    fn test_delete_index_requires_table() {
        let recorder = Recorder::new(DatabaseProvider::Postgres);
        let err = DeleteBuilder::new(recorder.target())
            .index("IX_person_email")
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("table name is required"));
    }

    #[test]
    fn test_delete_foreign_key() {
        let recorder = Recorder::new(DatabaseProvider::Postgres);
        DeleteBuilder::new(recorder.target())
            .foreign_key("FK_post_person_id")
            .on_table("post")
            .exec()
            .unwrap();
        assert_eq!(
            recorder.sql(),
            vec!["ALTER TABLE \"post\" DROP CONSTRAINT \"FK_post_person_id\""]
        );
        assert!(matches!(
            recorder.expressions.borrow()[0],
            Expression::DeleteForeignKey { .. }
        ));

        let sqlite = Recorder::new(DatabaseProvider::Sqlite);
        let err = DeleteBuilder::new(sqlite.target())
            .foreign_key("FK_post_person_id")
            .on_table("post")
            .exec()
            .unwrap_err();
        assert!(matches!(err, MigrationError::Unsupported { .. }));
    }

    #[test]
    fn test_delete_default_constraint() {
        let recorder = Recorder::new(DatabaseProvider::Postgres);
        DeleteBuilder::new(recorder.target())
            .default_constraint()
            .on_table("node")
            .on_column("trashed")
            .exec()
            .unwrap();
        assert_eq!(
            recorder.sql(),
            vec!["ALTER TABLE \"node\" ALTER COLUMN \"trashed\" DROP DEFAULT"]
        );
    }

    #[test]
    fn test_delete_data() {
        let recorder = Recorder::new(DatabaseProvider::Sqlite);
        DeleteBuilder::new(recorder.target())
            .data()
            .from_table("tag")
            .row(row! { "group" => "legacy" })
            .is_null("text")
            .exec()
            .unwrap();
        DeleteBuilder::new(recorder.target())
            .data()
            .from_table("cache")
            .all_rows()
            .exec()
            .unwrap();
        assert_eq!(
            recorder.sql(),
            vec![
                "DELETE FROM \"tag\" WHERE \"group\" = 'legacy'",
                "DELETE FROM \"tag\" WHERE \"text\" IS NULL",
                "DELETE FROM \"cache\"",
            ]
        );
    }

    #[test]
    fn test_delete_data_requires_a_filter() {
        let recorder = Recorder::new(DatabaseProvider::Sqlite);
        let err = DeleteBuilder::new(recorder.target())
            .data()
            .from_table("tag")
            .exec()
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidExpression { expression: "delete data", .. }));
    }
}
