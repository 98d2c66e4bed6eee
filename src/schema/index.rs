//! Index definition metadata

use super::Clustering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    pub name: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexDefinition {
    /// `IX_{table}_{first column}` when unset
    pub name: Option<String>,
    pub table_name: String,
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
    pub clustering: Clustering,
}

impl IndexDefinition {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn resolved_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!(
                "IX_{}_{}",
                self.table_name,
                self.columns.first().map(|c| c.name.as_str()).unwrap_or_default()
            ),
        }
    }
}
