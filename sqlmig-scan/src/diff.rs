//! Model diffing between a recorded snapshot and the declared model.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::relational::{Column, RelationalModel, Table};

/// One structural change with the differ's destructiveness verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireDiffEntry", into = "WireDiffEntry")]
pub struct DiffEntry {
    /// The change.
    pub operation: MigrationOperation,
    /// Whether applying the change can lose data.
    pub destructive: bool,
}

impl DiffEntry {
    /// Create a non-destructive entry.
    pub fn new(operation: MigrationOperation) -> Self {
        Self {
            operation,
            destructive: false,
        }
    }

    /// Set the destructive flag.
    pub fn destructive(mut self, destructive: bool) -> Self {
        self.destructive = destructive;
        self
    }

    /// Wire kind of the operation.
    pub fn kind(&self) -> &str {
        self.operation.kind()
    }
}

/// A structural change to a relational model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOperation {
    /// Ensure a schema exists.
    EnsureSchema {
        /// Schema name.
        name: String,
    },
    /// Create a table.
    CreateTable {
        /// Schema, if any.
        schema: Option<String>,
        /// Table name.
        name: String,
        /// Column names.
        columns: Vec<String>,
    },
    /// Drop a table.
    DropTable {
        /// Schema, if any.
        schema: Option<String>,
        /// Table name.
        name: String,
    },
    /// Add a column.
    AddColumn {
        /// Schema, if any.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Column name.
        name: String,
        /// Store type.
        store_type: Option<String>,
        /// Whether the column accepts NULL.
        nullable: bool,
    },
    /// Drop a column.
    DropColumn {
        /// Schema, if any.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Column name.
        name: String,
    },
    /// Alter a column.
    AlterColumn {
        /// Schema, if any.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Column name.
        name: String,
        /// Previous store type.
        old_store_type: Option<String>,
        /// New store type.
        store_type: Option<String>,
    },
    /// Anything else; rendered through its own text.
    Other {
        /// Wire kind.
        kind: String,
        /// Default textual form.
        text: Option<String>,
    },
}

impl MigrationOperation {
    /// Wire kind of this operation.
    pub fn kind(&self) -> &str {
        match self {
            Self::EnsureSchema { .. } => "ensure_schema",
            Self::CreateTable { .. } => "create_table",
            Self::DropTable { .. } => "drop_table",
            Self::AddColumn { .. } => "add_column",
            Self::DropColumn { .. } => "drop_column",
            Self::AlterColumn { .. } => "alter_column",
            Self::Other { kind, .. } => kind,
        }
    }
}

/// Flat wire form of a diff entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireDiffEntry {
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    store_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    old_store_type: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    nullable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default)]
    destructive: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl From<WireDiffEntry> for DiffEntry {
    fn from(wire: WireDiffEntry) -> Self {
        let WireDiffEntry {
            kind,
            name,
            schema,
            table,
            store_type,
            old_store_type,
            nullable,
            columns,
            text,
            destructive,
        } = wire;

        let operation = match (kind.as_str(), name, table) {
            ("ensure_schema", Some(name), _) => MigrationOperation::EnsureSchema { name },
            ("create_table", Some(name), _) => MigrationOperation::CreateTable {
                schema,
                name,
                columns,
            },
            ("drop_table", Some(name), _) => MigrationOperation::DropTable { schema, name },
            ("add_column", Some(name), Some(table)) => MigrationOperation::AddColumn {
                schema,
                table,
                name,
                store_type,
                nullable,
            },
            ("drop_column", Some(name), Some(table)) => MigrationOperation::DropColumn {
                schema,
                table,
                name,
            },
            ("alter_column", Some(name), Some(table)) => MigrationOperation::AlterColumn {
                schema,
                table,
                name,
                old_store_type,
                store_type,
            },
            _ => MigrationOperation::Other { kind, text },
        };

        Self {
            operation,
            destructive,
        }
    }
}

impl From<DiffEntry> for WireDiffEntry {
    fn from(entry: DiffEntry) -> Self {
        let mut wire = WireDiffEntry {
            kind: entry.kind().to_string(),
            destructive: entry.destructive,
            ..Default::default()
        };

        match entry.operation {
            MigrationOperation::EnsureSchema { name } => wire.name = Some(name),
            MigrationOperation::CreateTable {
                schema,
                name,
                columns,
            } => {
                wire.schema = schema;
                wire.name = Some(name);
                wire.columns = columns;
            }
            MigrationOperation::DropTable { schema, name } => {
                wire.schema = schema;
                wire.name = Some(name);
            }
            MigrationOperation::AddColumn {
                schema,
                table,
                name,
                store_type,
                nullable,
            } => {
                wire.schema = schema;
                wire.table = Some(table);
                wire.name = Some(name);
                wire.store_type = store_type;
                wire.nullable = nullable;
            }
            MigrationOperation::DropColumn {
                schema,
                table,
                name,
            } => {
                wire.schema = schema;
                wire.table = Some(table);
                wire.name = Some(name);
            }
            MigrationOperation::AlterColumn {
                schema,
                table,
                name,
                old_store_type,
                store_type,
            } => {
                wire.schema = schema;
                wire.table = Some(table);
                wire.name = Some(name);
                wire.old_store_type = old_store_type;
                wire.store_type = store_type;
            }
            MigrationOperation::Other { text, .. } => wire.text = text,
        }

        wire
    }
}

type TableKey<'a> = (Option<&'a str>, &'a str);

/// Differ comparing the last recorded snapshot with the declared model.
pub struct ModelDiffer {
    /// Recorded snapshot; `None` means nothing has been recorded yet.
    snapshot: Option<RelationalModel>,
    /// Declared model.
    target: RelationalModel,
}

impl ModelDiffer {
    /// Create a differ against an empty snapshot.
    pub fn new(target: RelationalModel) -> Self {
        Self {
            snapshot: None,
            target,
        }
    }

    /// Set the recorded snapshot.
    pub fn with_snapshot(mut self, snapshot: Option<RelationalModel>) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// Compute the entries that bring the snapshot up to the declared model.
    pub fn diff(&self) -> Vec<DiffEntry> {
        let empty = RelationalModel::default();
        let source = self.snapshot.as_ref().unwrap_or(&empty);
        let target = &self.target;

        let source_tables = index_tables(source);
        let target_tables = index_tables(target);

        let mut entries = Vec::new();

        // Schemas first so created tables have somewhere to live
        let known_schemas: IndexSet<&str> = source_tables.keys().filter_map(|(s, _)| *s).collect();
        let wanted_schemas: IndexSet<&str> = target_tables.keys().filter_map(|(s, _)| *s).collect();
        for schema in wanted_schemas.difference(&known_schemas) {
            entries.push(DiffEntry::new(MigrationOperation::EnsureSchema {
                name: (*schema).to_string(),
            }));
        }

        // Tables to drop
        for (key, table) in &source_tables {
            if !target_tables.contains_key(key) {
                entries.push(
                    DiffEntry::new(MigrationOperation::DropTable {
                        schema: key.0.map(str::to_string),
                        name: table.name.clone(),
                    })
                    .destructive(true),
                );
            }
        }

        // Tables to create
        for (key, table) in &target_tables {
            if !source_tables.contains_key(key) {
                entries.push(DiffEntry::new(MigrationOperation::CreateTable {
                    schema: key.0.map(str::to_string),
                    name: table.name.clone(),
                    columns: table.columns.iter().map(|c| c.name.clone()).collect(),
                }));
            }
        }

        // Tables to alter
        for (key, target_table) in &target_tables {
            if let Some(source_table) = source_tables.get(key) {
                diff_tables(key.0, source_table, target_table, &mut entries);
            }
        }

        entries
    }
}

fn index_tables(model: &RelationalModel) -> IndexMap<TableKey<'_>, &Table> {
    model
        .tables
        .iter()
        .map(|t| ((model.schema_of(t), t.name.as_str()), t))
        .collect()
}

/// Diff two versions of the same table.
fn diff_tables(schema: Option<&str>, source: &Table, target: &Table, entries: &mut Vec<DiffEntry>) {
    let schema = schema.map(str::to_string);

    for column in &source.columns {
        if target.column(&column.name).is_none() {
            entries.push(
                DiffEntry::new(MigrationOperation::DropColumn {
                    schema: schema.clone(),
                    table: target.name.clone(),
                    name: column.name.clone(),
                })
                .destructive(true),
            );
        }
    }

    for column in &target.columns {
        if source.column(&column.name).is_none() {
            entries.push(DiffEntry::new(MigrationOperation::AddColumn {
                schema: schema.clone(),
                table: target.name.clone(),
                name: column.name.clone(),
                store_type: Some(column.store_type.clone()),
                nullable: column.nullable,
            }));
        }
    }

    for column in &target.columns {
        if let Some(previous) = source.column(&column.name) {
            if previous != column {
                entries.push(
                    DiffEntry::new(MigrationOperation::AlterColumn {
                        schema: schema.clone(),
                        table: target.name.clone(),
                        name: column.name.clone(),
                        old_store_type: Some(previous.store_type.clone()),
                        store_type: Some(column.store_type.clone()),
                    })
                    .destructive(is_destructive_alter(previous, column)),
                );
            }
        }
    }

    if source.primary_key != target.primary_key {
        entries.push(DiffEntry::new(MigrationOperation::Other {
            kind: "alter_primary_key".to_string(),
            text: Some(format!(
                "Alter Primary Key of Table '{}' to ({})",
                target.name,
                target.primary_key.join(", ")
            )),
        }));
    }
}

/// A column alteration loses data when the type changes, NULLs become disallowed,
/// or the maximum length shrinks.
fn is_destructive_alter(previous: &Column, next: &Column) -> bool {
    let type_changed = !previous.store_type.eq_ignore_ascii_case(&next.store_type);
    let narrowed_nullability = previous.nullable && !next.nullable;
    let shrunk = match (previous.max_length, next.max_length) {
        (None, Some(_)) => true,
        (Some(old), Some(new)) => new < old,
        _ => false,
    };

    type_changed || narrowed_nullability || shrunk
}
