//! Migration error taxonomy

use crate::database::{DatabaseProvider, DbError};
use std::time::Duration;

/// Errors raised while building, planning or running migrations
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A builder was materialized with missing or malformed fields.
    /// Always an authoring error in a step; raised before touching the database.
    #[error("invalid {expression} expression: {reason}")]
    InvalidExpression {
        expression: &'static str,
        reason: String,
    },

    /// The active dialect cannot express the requested operation
    #[error("{dialect} does not support {operation}")]
    Unsupported {
        dialect: DatabaseProvider,
        operation: String,
    },

    /// Pre-flight failed before any step ran; nothing was touched
    #[error("database not ready: {0}")]
    NotReady(String),

    /// A step failed while applying SQL or data changes.
    /// The state store still holds `from`.
    #[error("migration step {step} ({from} -> {to}) of plan '{plan}' failed: {source}")]
    StepFailed {
        plan: String,
        step: String,
        from: String,
        to: String,
        #[source]
        source: Box<MigrationError>,
    },

    /// Another process holds the migration lock for this plan
    #[error(
        "could not acquire migration lock for plan '{plan}' within {waited:?}; \
         another process may be migrating. If this persists, check for a stuck \
         migration process or release the lock row manually"
    )]
    LockNotAcquired { plan: String, waited: Duration },

    /// The plan graph is malformed or the requested plan is unknown
    #[error("invalid migration plan '{plan}': {reason}")]
    InvalidPlan { plan: String, reason: String },

    /// The database reported a provider name no syntax provider exists for
    #[error("unknown database provider: {0}")]
    UnknownProvider(String),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl MigrationError {
    pub(crate) fn invalid(expression: &'static str, reason: impl Into<String>) -> Self {
        MigrationError::InvalidExpression {
            expression,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(dialect: DatabaseProvider, operation: impl Into<String>) -> Self {
        MigrationError::Unsupported {
            dialect,
            operation: operation.into(),
        }
    }

    /// Whether retrying later, without changing anything, may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MigrationError::LockNotAcquired { .. }
                | MigrationError::NotReady(_)
                | MigrationError::Database(DbError::Busy(_))
        )
    }

    /// The innermost error, looking through `StepFailed`
    pub fn root_cause(&self) -> &MigrationError {
        match self {
            MigrationError::StepFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
