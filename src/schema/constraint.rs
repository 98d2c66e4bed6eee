//! Table constraint metadata

use super::Clustering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    /// Check constraint with its boolean SQL expression
    Check(String),
}

impl ConstraintKind {
    fn prefix(&self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "PK",
            ConstraintKind::Unique => "UQ",
            ConstraintKind::Check(_) => "CK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintDefinition {
    pub name: Option<String>,
    pub table_name: String,
    pub kind: ConstraintKind,
    pub clustering: Clustering,
    pub columns: Vec<String>,
}

impl ConstraintDefinition {
    pub fn new(kind: ConstraintKind) -> Self {
        Self {
            name: None,
            table_name: String::new(),
            kind,
            clustering: Clustering::Default,
            columns: Vec::new(),
        }
    }

    /// `PK_{table}`, `UQ_{table}_{columns}` or `CK_{table}` when unset
    pub fn resolved_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => match self.kind {
                ConstraintKind::Unique => {
                    format!("UQ_{}_{}", self.table_name, self.columns.join("_"))
                }
                _ => format!("{}_{}", self.kind.prefix(), self.table_name),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_names() {
        let mut pk = ConstraintDefinition::new(ConstraintKind::PrimaryKey);
        pk.table_name = "node".into();
        pk.columns = vec!["id".into()];
        assert_eq!(pk.resolved_name(), "PK_node");

        let mut uq = ConstraintDefinition::new(ConstraintKind::Unique);
        uq.table_name = "node".into();
        uq.columns = vec!["parentId".into(), "sortOrder".into()];
        assert_eq!(uq.resolved_name(), "UQ_node_parentId_sortOrder");
    }
}
