//! End-to-end upgrades against an embedded SQLite database

#![cfg(feature = "sqlite")]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tidemark::expressions::ColumnSyntax;
use tidemark::migration::{
    Migration, MigrationContext, PlanBuilder, PlanRegistry, RunPhase, RunResult, StateStore,
    Upgrader,
};
use tidemark::sqlite::SqliteDatabase;
use tidemark::syntax::SqliteSyntax;
use tidemark::{row, MigrationConfig, MigrationError, Value};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config() -> MigrationConfig {
    MigrationConfig {
        lock_timeout_seconds: 2,
        lock_poll_interval_ms: 10,
        ..Default::default()
    }
}

#[derive(Default)]
struct CreateFoo;

impl Migration for CreateFoo {
    fn migrate(&self, ctx: &MigrationContext<'_>) -> Result<(), MigrationError> {
        if ctx.table_exists("Foo")? {
            return Ok(());
        }
        ctx.create()
            .table("Foo")
            .with_column("id").as_integer().primary_key()
            .with_column("name").as_text().not_nullable()
            .exec()
    }
}

#[derive(Default)]
struct SeedFoo;

impl Migration for SeedFoo {
    fn migrate(&self, ctx: &MigrationContext<'_>) -> Result<(), MigrationError> {
        ctx.delete().data().from_table("Foo").row(row! { "id" => 1 }).exec()?;
        ctx.insert()
            .into_table("Foo")
            .row(row! { "id" => 1, "name" => "first" })
            .exec()
    }
}

fn core_plan() -> tidemark::MigrationPlan {
    PlanBuilder::new("core")
        .from("init")
        .to::<CreateFoo>("v1")
        .to::<SeedFoo>("v2")
        .build()
        .unwrap()
}

fn state_of(db: &SqliteDatabase, plan: &str) -> Option<String> {
    StateStore::new(db, &SqliteSyntax, "tidemark_state").get(plan).unwrap()
}

#[test]
fn core_plan_runs_to_final_state_then_no_ops() {
    init_logging();
    let db = SqliteDatabase::open_in_memory().unwrap();
    let mut registry = PlanRegistry::new();
    registry.register(core_plan()).unwrap();

    let before = MigrationContext::new(&db, &SqliteSyntax, "core");
    assert!(!before.table_exists("Foo").unwrap());

    let mut upgrader = Upgrader::new(&db, config());
    let report = upgrader.upgrade(&registry, "core").into_result().unwrap();
    assert_eq!(report.from_state, "init");
    assert_eq!(report.to_state, "v2");
    let steps: Vec<_> = report.steps.iter().map(|s| (s.step.as_str(), s.to.as_str())).collect();
    assert_eq!(steps, vec![("CreateFoo", "v1"), ("SeedFoo", "v2")]);

    let after = MigrationContext::new(&db, &SqliteSyntax, "core");
    assert!(after.table_exists("Foo").unwrap());
    assert!(after.column_exists("Foo", "name").unwrap());
    assert_eq!(state_of(&db, "core").as_deref(), Some("v2"));

    let rerun = upgrader.upgrade(&registry, "core").into_result().unwrap();
    assert_eq!(rerun.steps_applied(), 0);
    assert_eq!(rerun.from_state, "v2");
    assert_eq!(state_of(&db, "core").as_deref(), Some("v2"));
    let rows = after.fetch("SELECT id, name FROM Foo", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::from("first")));
}

#[test]
fn failed_step_leaves_previous_state_and_resume_runs_only_the_rest() {
    init_logging();

    let fail = Arc::new(AtomicBool::new(true));
    let b_runs = Arc::new(AtomicUsize::new(0));
    let c_runs = Arc::new(AtomicUsize::new(0));

    struct ToB(Arc<AtomicUsize>);

    impl Migration for ToB {
        fn name(&self) -> &str {
            "ToB"
        }

        fn migrate(&self, ctx: &MigrationContext<'_>) -> Result<(), MigrationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            CreateFoo.migrate(ctx)
        }
    }

    struct ToC(Arc<AtomicBool>, Arc<AtomicUsize>);

    impl Migration for ToC {
        fn name(&self) -> &str {
            "ToC"
        }

        fn migrate(&self, ctx: &MigrationContext<'_>) -> Result<(), MigrationError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            if self.0.load(Ordering::SeqCst) {
                return ctx.execute().sql("UPDATE no_such_table SET x = 1").exec();
            }
            ctx.create().column("created").on_table("Foo").as_date_time().nullable().exec()
        }
    }

    let (b, f, c) = (b_runs.clone(), fail.clone(), c_runs.clone());
    let plan = PlanBuilder::new("core")
        .from("A")
        .to_with("B", "ToB", Arc::new(move || Box::new(ToB(b.clone())) as Box<dyn Migration>))
        .to_with(
            "C",
            "ToC",
            Arc::new(move || Box::new(ToC(f.clone(), c.clone())) as Box<dyn Migration>),
        )
        .build()
        .unwrap();

    let db = SqliteDatabase::open_in_memory().unwrap();
    let mut upgrader = Upgrader::new(&db, config());

    match upgrader.execute(&plan) {
        RunResult::Failed(MigrationError::StepFailed { plan, step, from, to, .. }) => {
            assert_eq!(plan, "core");
            assert_eq!(step, "ToC");
            assert_eq!((from.as_str(), to.as_str()), ("B", "C"));
        }
        other => panic!("expected a step failure, got {other:?}"),
    }
    assert_eq!(upgrader.phase(), RunPhase::Failed);
    assert_eq!(state_of(&db, "core").as_deref(), Some("B"));

    fail.store(false, Ordering::SeqCst);
    let report = upgrader.execute(&plan).into_result().unwrap();
    assert_eq!(report.from_state, "B");
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].step, "ToC");
    assert_eq!(b_runs.load(Ordering::SeqCst), 1);
    assert_eq!(c_runs.load(Ordering::SeqCst), 2);
    assert_eq!(state_of(&db, "core").as_deref(), Some("C"));
}

#[test]
fn unknown_persisted_state_is_not_ready() {
    init_logging();
    let db = SqliteDatabase::open_in_memory().unwrap();
    let store = StateStore::new(&db, &SqliteSyntax, "tidemark_state");
    store.ensure().unwrap();
    store.set("core", "v9-from-the-future").unwrap();

    let mut upgrader = Upgrader::new(&db, config());
    let result = upgrader.execute(&core_plan());
    match &result {
        RunResult::NotReady { reason } => assert!(reason.contains("v9-from-the-future")),
        other => panic!("expected NotReady, got {other:?}"),
    }
    assert_eq!(upgrader.phase(), RunPhase::NotReady);
    assert!(!MigrationContext::new(&db, &SqliteSyntax, "core").table_exists("Foo").unwrap());
    assert_eq!(state_of(&db, "core").as_deref(), Some("v9-from-the-future"));
    assert!(result.into_result().unwrap_err().is_transient());
}

#[test]
fn dry_run_captures_sql_without_touching_the_database() {
    init_logging();
    let db = SqliteDatabase::open_in_memory().unwrap();
    let mut upgrader = Upgrader::new(&db, config().with_dry_run(true));

    let report = upgrader.execute(&core_plan()).into_result().unwrap();
    assert!(report.dry_run);
    assert_eq!(report.to_state, "v2");
    let sql: Vec<&str> = report.sql().collect();
    assert_eq!(sql.len(), 3);
    assert!(sql[0].starts_with("CREATE TABLE \"Foo\""));
    assert!(sql[2].starts_with("INSERT INTO \"Foo\""));

    let ctx = MigrationContext::new(&db, &SqliteSyntax, "core");
    assert!(!ctx.table_exists("Foo").unwrap());
    assert!(!ctx.table_exists("tidemark_state").unwrap());
    assert!(!ctx.table_exists("tidemark_lock").unwrap());
}

#[test]
fn status_reports_pending_steps_without_running_them() {
    init_logging();
    let db = SqliteDatabase::open_in_memory().unwrap();
    let plan = core_plan();
    let mut upgrader = Upgrader::new(&db, config());

    let status = upgrader.status(&plan).unwrap();
    assert_eq!(status.current_state, "init");
    assert!(!status.recorded);
    let pending: Vec<_> = status.pending.as_ref().unwrap().iter().map(|p| p.step.as_str()).collect();
    assert_eq!(pending, vec!["CreateFoo", "SeedFoo"]);
    assert!(!MigrationContext::new(&db, &SqliteSyntax, "core").table_exists("tidemark_state").unwrap());

    upgrader.execute(&plan).into_result().unwrap();
    let status = upgrader.status(&plan).unwrap();
    assert!(status.is_up_to_date());
    assert_eq!(status.pending, Some(vec![]));
    assert_eq!(status.to_string(), "core: up to date at 'v2'");
}

#[test]
fn post_migrations_run_after_progress_only() {
    init_logging();
    let flushes = Arc::new(AtomicUsize::new(0));

    struct FlushCache(Arc<AtomicUsize>);

    impl Migration for FlushCache {
        fn migrate(&self, _ctx: &MigrationContext<'_>) -> Result<(), MigrationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let counter = flushes.clone();
    let plan = PlanBuilder::new("core")
        .from("init")
        .to::<CreateFoo>("v1")
        .post_migration_with(
            "FlushCache",
            Arc::new(move || Box::new(FlushCache(counter.clone())) as Box<dyn Migration>),
        )
        .build()
        .unwrap();

    let db = SqliteDatabase::open_in_memory().unwrap();
    let mut upgrader = Upgrader::new(&db, config());
    upgrader.execute(&plan).into_result().unwrap();
    upgrader.execute(&plan).into_result().unwrap();
    assert_eq!(flushes.load(Ordering::SeqCst), 1);
}

#[test]
fn plans_keep_separate_state() {
    init_logging();

    #[derive(Default)]
    struct CreateBar;

    impl Migration for CreateBar {
        fn migrate(&self, ctx: &MigrationContext<'_>) -> Result<(), MigrationError> {
            if ctx.table_exists("Bar")? {
                return Ok(());
            }
            ctx.create().table("Bar").with_column("id").as_integer().primary_key().exec()
        }
    }

    let mut registry = PlanRegistry::new();
    registry.register(core_plan()).unwrap();
    registry
        .register(PlanBuilder::new("forms").to::<CreateBar>("1.0").build().unwrap())
        .unwrap();

    let db = SqliteDatabase::open_in_memory().unwrap();
    let reports = tidemark::migration::startup_upgrade_all(&db, &registry, &config()).unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(state_of(&db, "core").as_deref(), Some("v2"));
    assert_eq!(state_of(&db, "forms").as_deref(), Some("1.0"));
}
