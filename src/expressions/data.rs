//! `insert()` and `update()` builders

use super::{Expression, Target};
use crate::error::MigrationError;
use crate::schema::RowData;

pub struct InsertBuilder<'a> {
    target: Target<'a>,
    table: String,
    rows: Vec<RowData>,
    identity_insert: bool,
}

impl<'a> InsertBuilder<'a> {
    pub(crate) fn new(target: Target<'a>) -> Self {
        Self {
            target,
            table: String::new(),
            rows: Vec::new(),
            identity_insert: false,
        }
    }

    pub fn into_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn row(mut self, row: RowData) -> Self {
        self.rows.push(row);
        self
    }

    pub fn rows(mut self, rows: impl IntoIterator<Item = RowData>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Allow explicit values for identity columns on dialects that guard them
    pub fn enable_identity_insert(mut self) -> Self {
        self.identity_insert = true;
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        self.target.submit(Expression::Insert {
            table: self.table,
            rows: self.rows,
            identity_insert: self.identity_insert,
        })
    }
}

pub struct UpdateBuilder<'a> {
    target: Target<'a>,
}

impl<'a> UpdateBuilder<'a> {
    pub(crate) fn new(target: Target<'a>) -> Self {
        Self { target }
    }

    pub fn table(self, table: impl Into<String>) -> UpdateTableBuilder<'a> {
        UpdateTableBuilder {
            target: self.target,
            table: table.into(),
            set: RowData::new(),
            filter: None,
            all_rows: false,
        }
    }
}

/// Either `filter` or `all_rows` must be given; an unfiltered update is never implied
pub struct UpdateTableBuilder<'a> {
    target: Target<'a>,
    table: String,
    set: RowData,
    filter: Option<RowData>,
    all_rows: bool,
}

impl UpdateTableBuilder<'_> {
    pub fn set(mut self, values: RowData) -> Self {
        for (column, value) in values.iter() {
            self.set.push(column, value.clone());
        }
        self
    }

    /// Equality conditions, AND-ed; a `Null` value matches `IS NULL`
    pub fn filter(mut self, condition: RowData) -> Self {
        self.filter = Some(condition);
        self
    }

    pub fn all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }

    pub fn exec(self) -> Result<(), MigrationError> {
        self.target.submit(Expression::Update {
            table: self.table,
            set: self.set,
            filter: self.filter,
            all_rows: self.all_rows,
        })
    }
}
