//! Plan-driven migrations
//!
//! This module provides:
//! - the [`Migration`] step trait and the per-step [`MigrationContext`]
//! - [`MigrationPlan`] state graphs, authored with [`PlanBuilder`]
//! - the [`Upgrader`], which walks a plan under a database lock and persists
//!   progress after every step
//! - startup helpers and a process-wide [`InitGuard`]
//!
//! # Example
//!
//! ```rust,no_run
//! use tidemark::expressions::ColumnSyntax;
//! use tidemark::migration::{Migration, MigrationContext, PlanBuilder, PlanRegistry, Upgrader};
//! use tidemark::sqlite::SqliteDatabase;
//! use tidemark::{MigrationConfig, MigrationError};
//!
//! #[derive(Default)]
//! pub struct CreateUsersTable;
//!
//! impl Migration for CreateUsersTable {
//!     fn migrate(&self, ctx: &MigrationContext<'_>) -> Result<(), MigrationError> {
//!         if ctx.table_exists("users")? {
//!             return Ok(());
//!         }
//!         ctx.create()
//!             .table("users")
//!             .with_column("id").as_integer().primary_key().identity()
//!             .with_column("email").as_string().unique()
//!             .exec()
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = PlanRegistry::new();
//!     registry.register(PlanBuilder::new("core").to::<CreateUsersTable>("v1").build()?)?;
//!
//!     let db = SqliteDatabase::open("app.db")?;
//!     let report = Upgrader::new(&db, MigrationConfig::load()?)
//!         .upgrade(&registry, "core")
//!         .into_result()?;
//!     println!("now at {}", report.to_state);
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod lock;
pub mod migration;
pub mod plan;
pub mod startup;
pub mod state_table;
pub mod upgrader;

pub use context::MigrationContext;
pub use lock::{force_release, is_lock_held, MigrationLockGuard};
pub use migration::{factory_of, Migration, StepFactory};
pub use plan::{MigrationPlan, PlanBuilder, PlanRegistry, PostMigration, Transition, INITIAL_STATE};
pub use startup::{startup_upgrade, startup_upgrade_all, InitGuard};
pub use state_table::StateStore;
pub use upgrader::{AppliedStep, PendingStep, PlanStatus, RunPhase, RunResult, UpgradeReport, Upgrader};

pub use crate::error::MigrationError;
