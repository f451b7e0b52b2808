//! Human-readable rendering of diff entries.

use serde::Serialize;

use crate::diff::{DiffEntry, MigrationOperation};

/// Description and destructiveness of one pending change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeClassification {
    /// Human-readable description.
    pub description: String,
    /// Whether applying the change can lose data.
    pub destructive: bool,
}

/// Render a diff entry. The destructive flag is taken from the entry as-is.
pub fn classify(entry: &DiffEntry) -> ChangeClassification {
    let description = match &entry.operation {
        MigrationOperation::AddColumn { name, table, .. } => {
            format!("Add Column '{name}' to Table '{table}'")
        }
        MigrationOperation::DropColumn { name, table, .. } => {
            format!("Drop Column '{name}' from Table '{table}'")
        }
        MigrationOperation::AlterColumn { name, table, .. } => {
            format!("Alter Column '{name}' in Table '{table}'")
        }
        MigrationOperation::CreateTable { name, .. } => format!("Create Table '{name}'"),
        MigrationOperation::DropTable { name, .. } => format!("Drop Table '{name}'"),
        MigrationOperation::EnsureSchema { name } => format!("Ensure Schema '{name}'"),
        MigrationOperation::Other { kind, text } => text.clone().unwrap_or_else(|| kind.clone()),
    };

    ChangeClassification {
        description,
        destructive: entry.destructive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drop_column(name: &str, table: &str) -> DiffEntry {
        DiffEntry::new(MigrationOperation::DropColumn {
            schema: None,
            table: table.to_string(),
            name: name.to_string(),
        })
        .destructive(true)
    }

    #[test]
    fn test_drop_column() {
        let classification = classify(&drop_column("LastName", "Person"));
        assert_eq!(classification.description, "Drop Column 'LastName' from Table 'Person'");
        assert!(classification.destructive);
    }

    #[test]
    fn test_add_column() {
        let entry = DiffEntry::new(MigrationOperation::AddColumn {
            schema: Some("test".to_string()),
            table: "Person".to_string(),
            name: "FirstName".to_string(),
            store_type: Some("nvarchar(max)".to_string()),
            nullable: false,
        });

        let classification = classify(&entry);
        assert_eq!(classification.description, "Add Column 'FirstName' to Table 'Person'");
        assert!(!classification.destructive);
    }

    #[test]
    fn test_table_and_schema_templates() {
        let create = DiffEntry::new(MigrationOperation::CreateTable {
            schema: None,
            name: "Person".to_string(),
            columns: vec!["Id".to_string()],
        });
        let drop = DiffEntry::new(MigrationOperation::DropTable {
            schema: None,
            name: "Legacy".to_string(),
        })
        .destructive(true);
        let schema = DiffEntry::new(MigrationOperation::EnsureSchema {
            name: "test".to_string(),
        });
        let alter = DiffEntry::new(MigrationOperation::AlterColumn {
            schema: None,
            table: "Person".to_string(),
            name: "Username".to_string(),
            old_store_type: None,
            store_type: None,
        });

        assert_eq!(classify(&create).description, "Create Table 'Person'");
        assert_eq!(classify(&drop).description, "Drop Table 'Legacy'");
        assert!(classify(&drop).destructive);
        assert_eq!(classify(&schema).description, "Ensure Schema 'test'");
        assert_eq!(classify(&alter).description, "Alter Column 'Username' in Table 'Person'");
    }

    #[test]
    fn test_other_uses_text_then_kind() {
        let with_text = DiffEntry::new(MigrationOperation::Other {
            kind: "create_index".to_string(),
            text: Some("CreateIndexOperation IX_Person_Username".to_string()),
        });
        let bare = DiffEntry::new(MigrationOperation::Other {
            kind: "sql".to_string(),
            text: None,
        })
        .destructive(true);

        assert_eq!(
            classify(&with_text).description,
            "CreateIndexOperation IX_Person_Username"
        );
        let bare = classify(&bare);
        assert_eq!(bare.description, "sql");
        assert!(bare.destructive);
    }
}
