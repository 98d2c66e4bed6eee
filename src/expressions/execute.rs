//! `execute()` builder: raw SQL escape hatch

use super::{Expression, Target};
use crate::error::MigrationError;

pub struct ExecuteBuilder<'a> {
    target: Target<'a>,
    sql: String,
}

impl<'a> ExecuteBuilder<'a> {
    pub(crate) fn new(target: Target<'a>) -> Self {
        Self {
            target,
            sql: String::new(),
        }
    }

    /// SQL run verbatim; it is not rewritten for the active dialect
    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = sql.into();
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        self.target.submit(Expression::Execute { sql: self.sql })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseProvider;
    use crate::expressions::testing::Recorder;

    #[test]
    fn test_execute_passes_sql_through() {
        let recorder = Recorder::new(DatabaseProvider::Postgres);
        ExecuteBuilder::new(recorder.target())
            .sql("CREATE EXTENSION IF NOT EXISTS pgcrypto")
            .exec()
            .unwrap();
        assert_eq!(recorder.sql(), vec!["CREATE EXTENSION IF NOT EXISTS pgcrypto"]);
    }

    #[test]
    fn test_execute_rejects_blank_sql() {
        let recorder = Recorder::new(DatabaseProvider::Postgres);
        assert!(ExecuteBuilder::new(recorder.target()).sql("\n").exec().is_err());
        assert!(ExecuteBuilder::new(recorder.target()).exec().is_err());
    }
}
