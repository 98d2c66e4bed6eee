//! Foreign key definition metadata

/// Referential action for `ON DELETE` / `ON UPDATE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialAction {
    /// No clause is rendered; the database default applies
    #[default]
    None,
    Cascade,
    Restrict,
    SetNull,
    SetDefault,
}

/// `foreign_*` is the referencing (child) side, `primary_*` the referenced side
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForeignKeyDefinition {
    /// `FK_{foreign table}_{primary table}_{first primary column}` when unset
    pub name: Option<String>,
    pub foreign_table: String,
    pub foreign_columns: Vec<String>,
    pub primary_table: String,
    pub primary_columns: Vec<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl ForeignKeyDefinition {
    pub fn resolved_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!(
                "FK_{}_{}_{}",
                self.foreign_table,
                self.primary_table,
                self.primary_columns.first().map(String::as_str).unwrap_or_default()
            ),
        }
    }
}
