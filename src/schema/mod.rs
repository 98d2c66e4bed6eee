//! Schema model: in-memory descriptors of database objects
//!
//! These are the vocabulary every expression is built from. They hold
//! structured metadata only; rendering lives in [`crate::syntax`] and
//! validation of required fields happens when an expression is materialized.

pub mod column;
pub mod constraint;
pub mod data;
pub mod foreign_key;
pub mod index;
pub mod table;

pub use column::{Clustering, ColumnDefinition, DataType, DefaultValue, ModificationKind, SystemMethod};
pub use constraint::{ConstraintDefinition, ConstraintKind};
pub use data::RowData;
pub use foreign_key::{ForeignKeyDefinition, ReferentialAction};
pub use index::{Direction, IndexColumn, IndexDefinition};
pub use table::TableDefinition;

use crate::error::MigrationError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Quote characters, statement separators and control characters never appear
/// in identifiers the engine renders.
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[^"\[\]`;\x00-\x1F]+$"#).expect("identifier pattern is valid")
});

/// Check that `name` is a usable identifier for `what` inside `expression`
pub(crate) fn check_identifier(
    expression: &'static str,
    what: &str,
    name: &str,
) -> Result<(), MigrationError> {
    if name.trim().is_empty() {
        return Err(MigrationError::invalid(expression, format!("{what} is required")));
    }
    if !IDENTIFIER.is_match(name) {
        return Err(MigrationError::invalid(
            expression,
            format!("{what} '{name}' contains characters that cannot be quoted"),
        ));
    }
    Ok(())
}
