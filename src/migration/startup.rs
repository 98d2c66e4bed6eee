//! In-process upgrade helpers for application startup

use super::plan::PlanRegistry;
use super::upgrader::{RunResult, UpgradeReport, Upgrader};
use crate::config::MigrationConfig;
use crate::database::Database;
use crate::error::MigrationError;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

/// Upgrade one plan on application startup
///
/// Designed to be called during initialization, before serving traffic:
/// - **First process wins:** the first instance to start takes the plan lock and runs the steps
/// - **Other processes wait:** the rest poll for the lock, then find the plan up to date
/// - **Fail-fast:** a failed or not-ready upgrade is returned as an error; the host
///   should not start on a partially migrated schema
///
/// # Example
///
/// ```rust,no_run
/// use tidemark::migration::{startup_upgrade, PlanRegistry};
/// use tidemark::sqlite::SqliteDatabase;
/// use tidemark::MigrationConfig;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = SqliteDatabase::open("app.db")?;
///     let registry = PlanRegistry::new(); // register plans here
///     startup_upgrade(&db, &registry, "core", &MigrationConfig::load()?)?;
///     Ok(())
/// }
/// ```
///
/// # Errors
///
/// Returns `MigrationError::NotReady` when the database is unreachable or in
/// a state the plan does not know, and the run's error otherwise.
pub fn startup_upgrade(
    db: &dyn Database,
    registry: &PlanRegistry,
    plan_name: &str,
    config: &MigrationConfig,
) -> Result<UpgradeReport, MigrationError> {
    let mut upgrader = Upgrader::new(db, config.clone());
    let report = match upgrader.upgrade(registry, plan_name) {
        RunResult::Completed(report) => report,
        RunResult::NotReady { reason } => return Err(MigrationError::NotReady(reason)),
        RunResult::Failed(err) => return Err(err),
    };

    if report.steps_applied() > 0 {
        log::info!("Applied {} migration step(s) on startup", report.steps_applied());
    } else {
        log::debug!("No pending migration steps for plan '{}'", plan_name);
    }
    Ok(report)
}

/// Upgrade every registered plan, in name order, stopping at the first failure
pub fn startup_upgrade_all(
    db: &dyn Database,
    registry: &PlanRegistry,
    config: &MigrationConfig,
) -> Result<Vec<UpgradeReport>, MigrationError> {
    registry
        .names()
        .into_iter()
        .map(|name| startup_upgrade(db, registry, name, config))
        .collect()
}

static INITIALIZED: Lazy<Mutex<HashMap<String, Arc<Mutex<bool>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn slot(key: &str) -> Arc<Mutex<bool>> {
    INITIALIZED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(key.to_string())
        .or_default()
        .clone()
}

/// Process-wide once-per-key initialization flag
///
/// Guards work that must happen once per process (typically running
/// [`startup_upgrade`] before the first request) and can be torn down again,
/// e.g. between tests or after a reinstall.
pub struct InitGuard;

impl InitGuard {
    /// Run `init` unless `key` is already initialized
    ///
    /// Concurrent callers for the same key block until the first finishes;
    /// `init` runs at most once per successful initialization. Other keys are
    /// never blocked, so `init` may itself use the guard for other keys.
    /// Returns whether `init` ran in this call.
    pub fn init<F>(key: &str, init: F) -> Result<bool, MigrationError>
    where
        F: FnOnce() -> Result<(), MigrationError>,
    {
        let slot = slot(key);
        let mut done = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if *done {
            return Ok(false);
        }
        init()?;
        *done = true;
        log::debug!("Initialized '{}'", key);
        Ok(true)
    }

    /// Whether `key` has finished initializing; false while its `init` is running
    pub fn is_initialized(key: &str) -> bool {
        let slot = match INITIALIZED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            Some(slot) => slot.clone(),
            None => return false,
        };
        let done = match slot.try_lock() {
            Ok(done) => *done,
            Err(TryLockError::Poisoned(poisoned)) => *poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => false,
        };
        done
    }

    /// Clear `key` so the next [`init`](Self::init) runs again
    ///
    /// Waits for an `init` of the same key that is still running.
    pub fn teardown(key: &str) -> bool {
        let slot = INITIALIZED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        match slot {
            Some(slot) => {
                let mut done = slot.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::replace(&mut *done, false)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_init_guard_runs_once_until_teardown() {
        let runs = AtomicUsize::new(0);
        let init = || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        assert!(InitGuard::init("startup-test", init).unwrap());
        assert!(!InitGuard::init("startup-test", init).unwrap());
        assert!(InitGuard::is_initialized("startup-test"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert!(InitGuard::teardown("startup-test"));
        assert!(!InitGuard::is_initialized("startup-test"));
        assert!(InitGuard::init("startup-test", init).unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_init_can_be_retried() {
        let err = InitGuard::init("startup-failing", || {
            Err(MigrationError::NotReady("database is down".into()))
        });
        assert!(err.is_err());
        assert!(!InitGuard::is_initialized("startup-failing"));
        assert!(InitGuard::init("startup-failing", || Ok(())).unwrap());
    }

    #[test]
    fn test_init_may_use_the_guard_for_other_keys() {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let outcome = InitGuard::init("startup-outer", || {
                assert!(!InitGuard::is_initialized("startup-outer"));
                assert!(!InitGuard::is_initialized("startup-sibling"));
                assert!(InitGuard::init("startup-inner", || Ok(()))?);
                assert!(InitGuard::is_initialized("startup-inner"));
                Ok(())
            });
            let _ = tx.send(outcome.map_err(|e| e.to_string()));
        });

        let outcome = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("nested init should not block");
        assert_eq!(outcome, Ok(true));
        assert!(InitGuard::is_initialized("startup-outer"));
        assert!(InitGuard::is_initialized("startup-inner"));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_startup_upgrade_reports_unknown_plan() {
        let db = crate::sqlite::SqliteDatabase::open_in_memory().unwrap();
        let err = startup_upgrade(&db, &PlanRegistry::new(), "core", &MigrationConfig::default())
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidPlan { .. }));
    }
}
