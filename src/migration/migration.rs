//! Migration step trait definition

use super::context::MigrationContext;
use crate::error::MigrationError;
use std::sync::Arc;

/// One unit of schema or data change
///
/// The upgrader builds a fresh instance from the plan's factory for every run
/// and calls [`migrate`](Self::migrate) exactly once with a fresh context.
///
/// Steps must be idempotent against their own target state: the same plan may
/// meet a fresh install that already has the final shape, or a database left
/// half-way by a failed run. Check before changing:
///
/// ```rust,no_run
/// use tidemark::expressions::ColumnSyntax;
/// use tidemark::migration::{Migration, MigrationContext};
/// use tidemark::MigrationError;
///
/// #[derive(Default)]
/// pub struct AddFooTable;
///
/// impl Migration for AddFooTable {
///     fn migrate(&self, ctx: &MigrationContext<'_>) -> Result<(), MigrationError> {
///         if ctx.table_exists("Foo")? {
///             return Ok(());
///         }
///         ctx.create()
///             .table("Foo")
///             .with_column("id").as_integer().primary_key()
///             .with_column("name").as_text()
///             .exec()
///     }
/// }
/// ```
///
/// Side effects are visible immediately. Any error aborts the run and leaves
/// the persisted state at the previous step's target.
pub trait Migration {
    /// Step name used in logs, reports and errors; defaults to the type name
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Apply the step
    ///
    /// Synchronous: the engine drives one connection from one thread and a
    /// step is never preempted once it has started.
    fn migrate(&self, ctx: &MigrationContext<'_>) -> Result<(), MigrationError>;
}

/// Creates a fresh step instance for each run
pub type StepFactory = Arc<dyn Fn() -> Box<dyn Migration> + Send + Sync>;

/// Factory for a `Default`-constructible step
pub fn factory_of<M: Migration + Default + 'static>() -> StepFactory {
    Arc::new(|| Box::new(M::default()) as Box<dyn Migration>)
}

/// `my_crate::steps::AddFooTable` -> `AddFooTable`
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}
