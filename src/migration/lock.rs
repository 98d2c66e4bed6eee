//! Table-based migration lock
//!
//! One row per plan in the lock table. The process whose insert-if-absent
//! lands the row holds the lock; everyone else polls until the row is gone
//! or the timeout expires. The row carries a random owner id so a guard only
//! ever deletes its own row.

use crate::config::MigrationConfig;
use crate::database::{Database, DbError, Value};
use crate::error::MigrationError;
use crate::expressions::Expression;
use crate::schema::{ColumnDefinition, DataType, TableDefinition};
use crate::syntax::SqlSyntaxProvider;
use chrono::Utc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::state_table::plan_name_column;

/// Lock guard that releases the lock when dropped
///
/// Release happens on every exit path of the run holding it, including
/// early returns and panics unwinding through the upgrader.
pub struct MigrationLockGuard<'a> {
    db: &'a dyn Database,
    syntax: &'a dyn SqlSyntaxProvider,
    table: String,
    plan: String,
    owner: Uuid,
}

impl<'a> MigrationLockGuard<'a> {
    /// Acquire the lock for `plan`, waiting up to the configured timeout
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockNotAcquired` if another owner still holds
    /// the lock when the timeout expires, or a database error if the lock
    /// table cannot be created or written. A busy database counts as a held
    /// lock and is retried until the timeout.
    pub fn acquire(
        db: &'a dyn Database,
        syntax: &'a dyn SqlSyntaxProvider,
        config: &MigrationConfig,
        plan: &str,
    ) -> Result<Self, MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = crate::metrics::tracing_helpers::lock_span(plan).entered();

        ensure_lock_table(db, syntax, &config.lock_table)?;

        let owner = Uuid::new_v4();
        let timeout = config.lock_timeout();
        let start = Instant::now();
        let sql = syntax.format_insert_if_absent(
            &config.lock_table,
            &["plan_name", "owner", "acquired_at"],
        );

        loop {
            let params = [
                Value::from(plan),
                Value::from(owner.to_string()),
                Value::DateTime(Utc::now().naive_utc()),
            ];
            let inserted = match db.execute(&sql, &params) {
                Ok(rows) => rows > 0,
                // The holder is mid-transaction; same as finding the row
                Err(DbError::Busy(reason)) => {
                    log::debug!("Lock table for plan '{}' is busy: {}", plan, reason);
                    false
                }
                Err(e) => return Err(e.into()),
            };
            if inserted {
                let waited = start.elapsed();
                crate::metrics::record_lock_wait(plan, waited);
                log::info!(
                    "Acquired migration lock for plan '{}' (owner {}, waited {:?})",
                    plan,
                    owner,
                    waited
                );
                return Ok(Self {
                    db,
                    syntax,
                    table: config.lock_table.clone(),
                    plan: plan.to_string(),
                    owner,
                });
            }

            let waited = start.elapsed();
            if waited >= timeout {
                crate::metrics::record_lock_wait(plan, waited);
                log::warn!("Gave up waiting for migration lock on plan '{}'", plan);
                return Err(MigrationError::LockNotAcquired {
                    plan: plan.to_string(),
                    waited,
                });
            }
            log::debug!("Migration lock for plan '{}' is held, retrying", plan);
            std::thread::sleep(config.lock_poll_interval().min(timeout - waited));
        }
    }

    pub fn plan(&self) -> &str {
        &self.plan
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    fn release(&self) -> Result<u64, MigrationError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = {} AND {} = {}",
            self.syntax.quoted_table_name(&self.table),
            self.syntax.quoted_column_name("plan_name"),
            self.syntax.parameter(1),
            self.syntax.quoted_column_name("owner"),
            self.syntax.parameter(2)
        );
        let params = [Value::from(self.plan.as_str()), Value::from(self.owner.to_string())];
        Ok(self.db.execute(&sql, &params)?)
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        match self.release() {
            Ok(0) => log::warn!(
                "Migration lock for plan '{}' was already gone on release",
                self.plan
            ),
            Ok(_) => log::info!("Released migration lock for plan '{}'", self.plan),
            Err(e) => log::error!(
                "Failed to release migration lock for plan '{}': {}",
                self.plan,
                e
            ),
        }
    }
}

pub(crate) fn lock_table_definition(
    syntax: &dyn SqlSyntaxProvider,
    table: &str,
) -> TableDefinition {
    let mut definition = TableDefinition::new(table);
    let mut plan_name = plan_name_column(syntax);
    plan_name.is_primary_key = true;
    let mut owner = ColumnDefinition::new("owner");
    owner.data_type = Some(DataType::String);
    owner.size = Some(36);
    let mut acquired_at = ColumnDefinition::new("acquired_at");
    acquired_at.data_type = Some(DataType::DateTime);
    definition.columns = vec![plan_name, owner, acquired_at];
    definition
}

/// Create the lock table unless it already exists
///
/// Several processes may race here on first start; losing the race to
/// another creator is not an error.
pub fn ensure_lock_table(
    db: &dyn Database,
    syntax: &dyn SqlSyntaxProvider,
    table: &str,
) -> Result<(), MigrationError> {
    if syntax.table_exists(db, table)? {
        return Ok(());
    }
    match Expression::CreateTable(lock_table_definition(syntax, table)).execute(db, syntax) {
        Ok(()) => {
            log::info!("Created migration lock table {}", table);
            Ok(())
        }
        Err(e) if syntax.table_exists(db, table)? => {
            log::debug!("Lock table {} was created concurrently: {}", table, e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Whether any process currently holds the lock for `plan`
pub fn is_lock_held(
    db: &dyn Database,
    syntax: &dyn SqlSyntaxProvider,
    table: &str,
    plan: &str,
) -> Result<bool, MigrationError> {
    if !syntax.table_exists(db, table)? {
        return Ok(false);
    }
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        syntax.quoted_column_name("owner"),
        syntax.quoted_table_name(table),
        syntax.quoted_column_name("plan_name"),
        syntax.parameter(1)
    );
    Ok(!db.query_all(&sql, &[Value::from(plan)])?.is_empty())
}

/// Delete the lock row for `plan` regardless of owner
///
/// For operators recovering from a crashed process. Running this while a
/// live process holds the lock lets a second process in.
pub fn force_release(
    db: &dyn Database,
    syntax: &dyn SqlSyntaxProvider,
    table: &str,
    plan: &str,
) -> Result<bool, MigrationError> {
    if !syntax.table_exists(db, table)? {
        return Ok(false);
    }
    let sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        syntax.quoted_table_name(table),
        syntax.quoted_column_name("plan_name"),
        syntax.parameter(1)
    );
    let removed = db.execute(&sql, &[Value::from(plan)])? > 0;
    if removed {
        log::warn!("Force-released migration lock for plan '{}'", plan);
    }
    Ok(removed)
}
