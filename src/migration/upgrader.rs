//! Plan executor
//!
//! [`Upgrader::execute`] runs the pending transitions of one plan under the
//! plan's lock, persisting each transition's target state as soon as its step
//! succeeds. A failed or interrupted run therefore resumes at the first step
//! that did not complete.

use super::context::MigrationContext;
use super::lock::MigrationLockGuard;
use super::migration::Migration;
use super::plan::{MigrationPlan, PlanRegistry};
use super::state_table::StateStore;
use crate::config::MigrationConfig;
use crate::database::Database;
use crate::error::MigrationError;
use crate::syntax::{syntax_for_database, SqlSyntaxProvider};
use std::fmt;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Where the upgrader is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Completed,
    NotReady,
    Failed,
}

/// Outcome of one run
#[derive(Debug)]
pub enum RunResult {
    Completed(UpgradeReport),
    /// Nothing was touched; retrying later is safe
    NotReady { reason: String },
    Failed(MigrationError),
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunResult::Completed(_))
    }

    pub fn phase(&self) -> RunPhase {
        match self {
            RunResult::Completed(_) => RunPhase::Completed,
            RunResult::NotReady { .. } => RunPhase::NotReady,
            RunResult::Failed(_) => RunPhase::Failed,
        }
    }

    /// Collapse into a `Result`, mapping `NotReady` to `MigrationError::NotReady`
    pub fn into_result(self) -> Result<UpgradeReport, MigrationError> {
        match self {
            RunResult::Completed(report) => Ok(report),
            RunResult::NotReady { reason } => Err(MigrationError::NotReady(reason)),
            RunResult::Failed(err) => Err(err),
        }
    }
}

/// A step that ran to completion
#[derive(Debug, Clone)]
pub struct AppliedStep {
    pub step: String,
    pub from: String,
    pub to: String,
    pub elapsed: Duration,
    /// Statements executed (or only rendered, in dry-run mode)
    pub sql: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UpgradeReport {
    pub plan: String,
    pub from_state: String,
    pub to_state: String,
    pub steps: Vec<AppliedStep>,
    pub post_migrations: Vec<AppliedStep>,
    pub dry_run: bool,
}

impl UpgradeReport {
    pub fn steps_applied(&self) -> usize {
        self.steps.len()
    }

    /// Every statement of the run, in execution order
    pub fn sql(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .chain(&self.post_migrations)
            .flat_map(|step| step.sql.iter().map(String::as_str))
    }
}

/// A transition that has not run yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStep {
    pub step: String,
    pub from: String,
    pub to: String,
}

/// Where a plan stands, read without taking the lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStatus {
    pub plan: String,
    /// Persisted state, or the plan's initial state if none is recorded
    pub current_state: String,
    pub recorded: bool,
    pub final_state: String,
    /// `None` when the current state is not part of the plan
    pub pending: Option<Vec<PendingStep>>,
}

impl PlanStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.current_state == self.final_state
    }

    pub fn is_known_state(&self) -> bool {
        self.pending.is_some()
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pending {
            None => write!(
                f,
                "{}: state '{}' is not part of the plan",
                self.plan, self.current_state
            ),
            Some(pending) if pending.is_empty() => {
                write!(f, "{}: up to date at '{}'", self.plan, self.current_state)
            }
            Some(pending) => write!(
                f,
                "{}: at '{}', {} step(s) pending to '{}'",
                self.plan,
                self.current_state,
                pending.len(),
                self.final_state
            ),
        }
    }
}

/// Runs plans against one database
///
/// ```rust,no_run
/// # use tidemark::migration::{MigrationPlan, RunResult, Upgrader};
/// # use tidemark::{Database, MigrationConfig};
/// # fn example(db: &dyn Database, plan: &MigrationPlan) {
/// let mut upgrader = Upgrader::new(db, MigrationConfig::default());
/// match upgrader.execute(plan) {
///     RunResult::Completed(report) => println!("applied {} step(s)", report.steps_applied()),
///     RunResult::NotReady { reason } => eprintln!("not ready: {}", reason),
///     RunResult::Failed(err) => panic!("schema upgrade failed: {}", err),
/// }
/// # }
/// ```
pub struct Upgrader<'a> {
    db: &'a dyn Database,
    config: MigrationConfig,
    phase: RunPhase,
}

impl<'a> Upgrader<'a> {
    pub fn new(db: &'a dyn Database, config: MigrationConfig) -> Self {
        Self {
            db,
            config,
            phase: RunPhase::Idle,
        }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Phase of the most recent run, `Idle` before the first
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Look `plan_name` up in `registry` and execute it
    pub fn upgrade(&mut self, registry: &PlanRegistry, plan_name: &str) -> RunResult {
        match registry.get(plan_name) {
            Some(plan) => self.execute(&plan),
            None => {
                self.phase = RunPhase::Failed;
                RunResult::Failed(MigrationError::InvalidPlan {
                    plan: plan_name.to_string(),
                    reason: "no plan is registered under this name".to_string(),
                })
            }
        }
    }

    /// Run every pending transition of `plan`
    pub fn execute(&mut self, plan: &MigrationPlan) -> RunResult {
        self.phase = RunPhase::Running;
        let result = match self.run(plan) {
            Ok(result) => result,
            Err(err) => RunResult::Failed(err),
        };
        self.phase = result.phase();
        match &result {
            RunResult::Completed(report) if report.steps.is_empty() => {
                log::info!(
                    "Plan '{}' is up to date at state '{}'",
                    plan.name(),
                    report.to_state
                );
            }
            RunResult::Completed(report) => log::info!(
                "Plan '{}' upgraded from '{}' to '{}' ({} step(s){})",
                plan.name(),
                report.from_state,
                report.to_state,
                report.steps.len(),
                if report.dry_run { ", dry run" } else { "" }
            ),
            RunResult::NotReady { reason } => {
                log::warn!("Plan '{}' not ready: {}", plan.name(), reason)
            }
            RunResult::Failed(err) => log::error!("Plan '{}' failed: {}", plan.name(), err),
        }
        result
    }

    /// Current and pending state of `plan`; takes no lock and changes nothing
    pub fn status(&self, plan: &MigrationPlan) -> Result<PlanStatus, MigrationError> {
        let syntax = syntax_for_database(self.db)?;
        let store = StateStore::new(self.db, syntax.as_ref(), &self.config.state_table);
        let recorded = if store.exists()? {
            store.get(plan.name())?
        } else {
            None
        };
        let current_state = recorded
            .clone()
            .unwrap_or_else(|| plan.initial_state().to_string());
        let pending = plan.steps_from(&current_state).map(|steps| {
            steps
                .into_iter()
                .map(|t| PendingStep {
                    step: t.step_name().to_string(),
                    from: t.source().to_string(),
                    to: t.target().to_string(),
                })
                .collect()
        });
        Ok(PlanStatus {
            plan: plan.name().to_string(),
            current_state,
            recorded: recorded.is_some(),
            final_state: plan.final_state().to_string(),
            pending,
        })
    }

    fn run(&self, plan: &MigrationPlan) -> Result<RunResult, MigrationError> {
        let syntax = syntax_for_database(self.db)?;
        let syntax = syntax.as_ref();

        if self.config.preflight_check {
            if let Err(e) = self.db.ping() {
                return Ok(RunResult::NotReady {
                    reason: format!("database is unreachable: {}", e),
                });
            }
        }

        let dry_run = self.config.dry_run;
        let _lock = if dry_run {
            None
        } else {
            Some(MigrationLockGuard::acquire(self.db, syntax, &self.config, plan.name())?)
        };

        let store = StateStore::new(self.db, syntax, &self.config.state_table);
        let recorded = if dry_run {
            if store.exists()? {
                store.get(plan.name())?
            } else {
                None
            }
        } else {
            store.ensure()?;
            store.get(plan.name())?
        };
        let from_state = recorded.unwrap_or_else(|| plan.initial_state().to_string());

        let Some(transitions) = plan.steps_from(&from_state) else {
            return Ok(RunResult::NotReady {
                reason: format!(
                    "state '{}' is not part of plan '{}'",
                    from_state,
                    plan.name()
                ),
            });
        };

        log::info!(
            "Plan '{}' at state '{}': {} step(s) to run{}",
            plan.name(),
            from_state,
            transitions.len(),
            if dry_run { " (dry run)" } else { "" }
        );

        let mut report = UpgradeReport {
            plan: plan.name().to_string(),
            from_state: from_state.clone(),
            to_state: from_state,
            steps: Vec::with_capacity(transitions.len()),
            post_migrations: Vec::new(),
            dry_run,
        };

        for transition in transitions {
            let step = transition.create_step();
            let applied = self
                .run_step(
                    plan,
                    syntax,
                    &store,
                    step.as_ref(),
                    transition.step_name(),
                    transition.source(),
                    Some(transition.target()),
                )
                .map_err(|source| {
                    log::error!(
                        "Migration step {} of plan '{}' failed moving '{}' -> '{}': {}",
                        transition.step_name(),
                        plan.name(),
                        transition.source(),
                        transition.target(),
                        source
                    );
                    MigrationError::StepFailed {
                        plan: plan.name().to_string(),
                        step: transition.step_name().to_string(),
                        from: transition.source().to_string(),
                        to: transition.target().to_string(),
                        source: Box::new(source),
                    }
                })?;
            report.to_state = applied.to.clone();
            report.steps.push(applied);
        }

        if !report.steps.is_empty() {
            for post in plan.post_migrations() {
                let step = post.create_step();
                let state = report.to_state.clone();
                let applied = self
                    .run_step(plan, syntax, &store, step.as_ref(), post.name(), &state, None)
                    .map_err(|source| {
                        log::error!(
                            "Post-migration {} of plan '{}' failed: {}",
                            post.name(),
                            plan.name(),
                            source
                        );
                        MigrationError::StepFailed {
                            plan: plan.name().to_string(),
                            step: post.name().to_string(),
                            from: state.clone(),
                            to: state.clone(),
                            source: Box::new(source),
                        }
                    })?;
                report.post_migrations.push(applied);
            }
        }

        Ok(RunResult::Completed(report))
    }

    /// Run one step in a fresh context; `target` is persisted on success
    /// unless this is a post-migration (`None`) or a dry run
    #[allow(clippy::too_many_arguments)]
    fn run_step(
        &self,
        plan: &MigrationPlan,
        syntax: &dyn SqlSyntaxProvider,
        store: &StateStore<'_>,
        step: &dyn Migration,
        step_name: &str,
        from: &str,
        target: Option<&str>,
    ) -> Result<AppliedStep, MigrationError> {
        let to = target.unwrap_or(from);

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::step_span(plan.name(), step_name, from, to).entered();

        let dry_run = self.config.dry_run;
        let transactional =
            !dry_run && self.config.transactional_steps && syntax.supports_transactional_ddl();
        let ctx = MigrationContext::new(self.db, syntax, plan.name()).with_dry_run(dry_run);

        log::info!("Running step {} ('{}' -> '{}')", step_name, from, to);
        let started = Instant::now();

        if transactional {
            self.db.begin()?;
        }
        let mut outcome = step.migrate(&ctx);
        if outcome.is_ok() && !dry_run {
            if let Some(target) = target {
                outcome = store.set(plan.name(), target);
            }
        }
        if transactional {
            outcome = match outcome {
                Ok(()) => self.db.commit().map_err(MigrationError::from),
                Err(e) => {
                    if let Err(rollback) = self.db.rollback() {
                        log::warn!("Rollback after failed step {} failed: {}", step_name, rollback);
                    }
                    Err(e)
                }
            };
        }

        let elapsed = started.elapsed();
        crate::metrics::record_step(plan.name(), elapsed, outcome.is_ok());
        outcome?;

        log::info!("Step {} completed in {:?}", step_name, elapsed);
        Ok(AppliedStep {
            step: step_name.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            elapsed,
            sql: ctx.take_captured_sql(),
        })
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::database::{DbError, Row, Value};
    use crate::expressions::ColumnSyntax;
    use crate::migration::PlanBuilder;
    use crate::sqlite::SqliteDatabase;
    use crate::syntax::SqliteSyntax;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

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
                .with_column("name").as_text()
                .exec()
        }
    }

    #[derive(Default)]
    struct Broken;

    impl Migration for Broken {
        fn migrate(&self, ctx: &MigrationContext<'_>) -> Result<(), MigrationError> {
            ctx.execute().sql("INSERT INTO missing_table VALUES (1)").exec()
        }
    }

    fn config() -> MigrationConfig {
        MigrationConfig {
            lock_timeout_seconds: 1,
            lock_poll_interval_ms: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_phase_follows_run() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let plan = PlanBuilder::new("core").from("init").to::<CreateFoo>("v1").build().unwrap();
        let mut upgrader = Upgrader::new(&db, config());
        assert_eq!(upgrader.phase(), RunPhase::Idle);

        let report = upgrader.execute(&plan).into_result().unwrap();
        assert_eq!(upgrader.phase(), RunPhase::Completed);
        assert_eq!(report.from_state, "init");
        assert_eq!(report.to_state, "v1");
        assert_eq!(report.steps[0].step, "CreateFoo");
        assert_eq!(report.sql().count(), 1);
    }

    #[test]
    fn test_failed_step_rolls_back_its_transaction() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let plan = PlanBuilder::new("core")
            .from("init")
            .to::<CreateFoo>("v1")
            .to::<Broken>("v2")
            .build()
            .unwrap();
        let mut upgrader = Upgrader::new(&db, config());

        let err = upgrader.execute(&plan).into_result().unwrap_err();
        assert_eq!(upgrader.phase(), RunPhase::Failed);
        match err {
            MigrationError::StepFailed { step, from, to, .. } => {
                assert_eq!(step, "Broken");
                assert_eq!(from, "v1");
                assert_eq!(to, "v2");
            }
            other => panic!("unexpected error: {other}"),
        }
        let status = upgrader.status(&plan).unwrap();
        assert_eq!(status.current_state, "v1");
        assert!(status.recorded);
    }

    #[test]
    fn test_unknown_plan_name_fails() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let mut upgrader = Upgrader::new(&db, config());
        let result = upgrader.upgrade(&PlanRegistry::new(), "nope");
        assert!(matches!(
            result,
            RunResult::Failed(MigrationError::InvalidPlan { ref plan, .. }) if plan == "nope"
        ));
    }

    #[test]
    fn test_post_migrations_only_after_progress() {
        let runs = Arc::new(AtomicUsize::new(0));

        struct Counting(Arc<AtomicUsize>);

        impl Migration for Counting {
            fn migrate(&self, _ctx: &MigrationContext<'_>) -> Result<(), MigrationError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let counter = runs.clone();
        let plan = PlanBuilder::new("core")
            .from("init")
            .to::<CreateFoo>("v1")
            .post_migration_with(
                "RebuildCache",
                Arc::new(move || Box::new(Counting(counter.clone())) as Box<dyn Migration>),
            )
            .build()
            .unwrap();

        let db = SqliteDatabase::open_in_memory().unwrap();
        let mut upgrader = Upgrader::new(&db, config());
        let report = upgrader.execute(&plan).into_result().unwrap();
        assert_eq!(report.post_migrations.len(), 1);
        assert_eq!(report.post_migrations[0].step, "RebuildCache");
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let report = upgrader.execute(&plan).into_result().unwrap();
        assert!(report.post_migrations.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_status_display() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let plan = PlanBuilder::new("core").from("init").to::<CreateFoo>("v1").build().unwrap();
        let upgrader = Upgrader::new(&db, config());
        let status = upgrader.status(&plan).unwrap();
        assert!(!status.recorded);
        assert_eq!(status.to_string(), "core: at 'init', 1 step(s) pending to 'v1'");
    }

    /// A reachable SQLite database whose health check fails
    struct Unreachable(SqliteDatabase);

    impl Database for Unreachable {
        fn provider_name(&self) -> &str {
            self.0.provider_name()
        }

        fn execute(&self, query: &str, params: &[Value]) -> Result<u64, DbError> {
            self.0.execute(query, params)
        }

        fn query_all(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
            self.0.query_all(query, params)
        }

        fn ping(&self) -> Result<(), DbError> {
            Err(DbError::Connection("connection refused".into()))
        }
    }

    #[test]
    fn test_failed_preflight_touches_nothing() {
        let db = Unreachable(SqliteDatabase::open_in_memory().unwrap());
        let plan = PlanBuilder::new("core").from("init").to::<CreateFoo>("v1").build().unwrap();
        let mut upgrader = Upgrader::new(&db, config());

        match upgrader.execute(&plan) {
            RunResult::NotReady { reason } => assert!(reason.contains("connection refused"), "{reason}"),
            other => panic!("expected NotReady, got {other:?}"),
        }
        assert_eq!(upgrader.phase(), RunPhase::NotReady);

        let ctx = MigrationContext::new(&db.0, &SqliteSyntax, "core");
        assert!(!ctx.table_exists("Foo").unwrap());
        assert!(!ctx.table_exists("tidemark_state").unwrap());
        assert!(!ctx.table_exists("tidemark_lock").unwrap());

        let skip = MigrationConfig {
            preflight_check: false,
            ..config()
        };
        let report = Upgrader::new(&db, skip).execute(&plan).into_result().unwrap();
        assert_eq!(report.to_state, "v1");
    }
}
