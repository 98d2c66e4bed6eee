//! Per-step execution context handed to [`Migration::migrate`](super::Migration::migrate)

use crate::database::{Database, DatabaseProvider, Row, Value};
use crate::error::MigrationError;
use crate::expressions::{
    AlterBuilder, CreateBuilder, DeleteBuilder, ExecuteBuilder, Expression, ExpressionRunner,
    IfDatabaseBuilder, InsertBuilder, RenameBuilder, Target, UpdateBuilder,
};
use crate::syntax::{ColumnInfo, IndexInfo, SqlSyntaxProvider};
use std::cell::RefCell;
use std::collections::BTreeSet;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Everything a step needs: the database, the active dialect, the builders
/// and introspection helpers
///
/// Expressions built from the context run immediately against the database
/// (or are only recorded in dry-run mode). Every statement rendered through
/// the context is kept, in order, and can be read back with
/// [`captured_sql`](Self::captured_sql).
pub struct MigrationContext<'a> {
    db: &'a dyn Database,
    syntax: &'a dyn SqlSyntaxProvider,
    plan_name: &'a str,
    dry_run: bool,
    captured: RefCell<Vec<String>>,
}

impl<'a> MigrationContext<'a> {
    pub fn new(db: &'a dyn Database, syntax: &'a dyn SqlSyntaxProvider, plan_name: &'a str) -> Self {
        Self {
            db,
            syntax,
            plan_name,
            dry_run: false,
            captured: RefCell::new(Vec::new()),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn database(&self) -> &'a dyn Database {
        self.db
    }

    pub fn syntax(&self) -> &'a dyn SqlSyntaxProvider {
        self.syntax
    }

    pub fn provider(&self) -> DatabaseProvider {
        self.syntax.provider()
    }

    pub fn plan_name(&self) -> &str {
        self.plan_name
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Statements executed (or, in dry-run mode, rendered) so far
    pub fn captured_sql(&self) -> Vec<String> {
        self.captured.borrow().clone()
    }

    pub(crate) fn take_captured_sql(&self) -> Vec<String> {
        self.captured.take()
    }

    // ----- builders -------------------------------------------------------

    pub fn create(&self) -> CreateBuilder<'_> {
        CreateBuilder::new(Target::new(self))
    }

    pub fn alter(&self) -> AlterBuilder<'_> {
        AlterBuilder::new(Target::new(self))
    }

    pub fn delete(&self) -> DeleteBuilder<'_> {
        DeleteBuilder::new(Target::new(self))
    }

    pub fn rename(&self) -> RenameBuilder<'_> {
        RenameBuilder::new(Target::new(self))
    }

    pub fn insert(&self) -> InsertBuilder<'_> {
        InsertBuilder::new(Target::new(self))
    }

    pub fn update(&self) -> UpdateBuilder<'_> {
        UpdateBuilder::new(Target::new(self))
    }

    pub fn execute(&self) -> ExecuteBuilder<'_> {
        ExecuteBuilder::new(Target::new(self))
    }

    /// Builders that only take effect when the active provider is one of `providers`
    pub fn if_database(&self, providers: &[DatabaseProvider]) -> IfDatabaseBuilder<'_> {
        IfDatabaseBuilder::new(Target::gated(self, providers))
    }

    // ----- introspection and data access ----------------------------------

    pub fn table_exists(&self, table: &str) -> Result<bool, MigrationError> {
        self.syntax.table_exists(self.db, table)
    }

    pub fn column_exists(&self, table: &str, column: &str) -> Result<bool, MigrationError> {
        self.syntax.column_exists(self.db, table, column)
    }

    pub fn index_exists(&self, index: &str) -> Result<bool, MigrationError> {
        self.syntax.index_exists(self.db, index)
    }

    pub fn tables(&self) -> Result<BTreeSet<String>, MigrationError> {
        self.syntax.tables_in_schema(self.db)
    }

    pub fn columns(&self) -> Result<BTreeSet<ColumnInfo>, MigrationError> {
        self.syntax.columns_in_schema(self.db)
    }

    pub fn indexes(&self) -> Result<Vec<IndexInfo>, MigrationError> {
        self.syntax.indexes_in_schema(self.db)
    }

    /// Read rows for data migrations. Runs in dry-run mode too.
    pub fn fetch(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, MigrationError> {
        log::debug!("Fetching: {}", sql);
        Ok(self.db.query_all(sql, params)?)
    }

    fn run_statement(&self, sql: String) -> Result<(), MigrationError> {
        if self.dry_run {
            log::info!("[dry run] {}", sql);
        } else {
            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::statement_span(&sql).entered();

            log::debug!("Executing: {}", sql);
            self.db.execute(&sql, &[])?;
        }
        self.captured.borrow_mut().push(sql);
        Ok(())
    }
}

impl ExpressionRunner for MigrationContext<'_> {
    fn syntax(&self) -> &dyn SqlSyntaxProvider {
        self.syntax
    }

    fn run(&self, expression: Expression) -> Result<(), MigrationError> {
        expression
            .to_sql(self.syntax)?
            .into_iter()
            .try_for_each(|sql| self.run_statement(sql))
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::expressions::ColumnSyntax;
    use crate::row;
    use crate::sqlite::SqliteDatabase;
    use crate::syntax::SqliteSyntax;

    #[test]
    fn test_builders_execute_against_database() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let ctx = MigrationContext::new(&db, &SqliteSyntax, "core");

        ctx.create()
            .table("person")
            .with_column("id").as_integer().primary_key().identity()
            .with_column("name").as_string()
            .exec()
            .unwrap();
        ctx.create().column("age").on_table("person").as_integer().with_default(0).exec().unwrap();
        ctx.insert().into_table("person").row(row! { "name" => "Ada" }).exec().unwrap();

        assert!(ctx.table_exists("person").unwrap());
        assert!(ctx.table_exists("PERSON").unwrap());
        assert!(ctx.column_exists("person", "age").unwrap());
        assert!(!ctx.column_exists("person", "height").unwrap());

        let rows = ctx.fetch("SELECT name, age FROM person", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("age"), Some(&Value::Int(0)));
        assert_eq!(ctx.captured_sql().len(), 3);
    }

    #[test]
    fn test_dry_run_captures_without_executing() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let ctx = MigrationContext::new(&db, &SqliteSyntax, "core").with_dry_run(true);

        ctx.create().table("Foo").with_column("id").as_integer().exec().unwrap();
        assert!(!ctx.table_exists("Foo").unwrap());
        assert_eq!(
            ctx.captured_sql(),
            vec!["CREATE TABLE \"Foo\" (\"id\" INTEGER NOT NULL)"]
        );
    }

    #[test]
    fn test_if_database_gates_by_provider() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let ctx = MigrationContext::new(&db, &SqliteSyntax, "core");

        ctx.if_database(&[DatabaseProvider::SqlServer])
            .execute()
            .sql("CREATE TABLE only_mssql (id INT)")
            .exec()
            .unwrap();
        ctx.if_database(&[DatabaseProvider::SqlServer, DatabaseProvider::Sqlite])
            .execute()
            .sql("CREATE TABLE both_dialects (id INTEGER)")
            .exec()
            .unwrap();

        assert!(!ctx.table_exists("only_mssql").unwrap());
        assert!(ctx.table_exists("both_dialects").unwrap());
    }

    #[test]
    fn test_index_introspection() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let ctx = MigrationContext::new(&db, &SqliteSyntax, "core");
        ctx.create()
            .table("person")
            .with_column("email").as_string().unique()
            .exec()
            .unwrap();

        assert!(ctx.index_exists("IX_person_email").unwrap());
        let indexes = ctx.indexes().unwrap();
        assert_eq!(indexes.len(), 1);
        assert!(indexes[0].unique);
        assert_eq!(indexes[0].table_name, "person");
    }
}
