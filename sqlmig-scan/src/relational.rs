//! Relational model graph exchanged with probes.

use serde::{Deserialize, Serialize};

/// A relational model: the declared model or a recorded snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationalModel {
    /// Schema applied to tables that do not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_schema: Option<String>,
    /// Tables in declaration order.
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl RelationalModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default schema.
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// Add a table.
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Effective schema of a table in this model.
    pub fn schema_of<'a>(&'a self, table: &'a Table) -> Option<&'a str> {
        table.schema.as_deref().or(self.default_schema.as_deref())
    }
}

/// A table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Explicit schema, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Primary key column names.
    #[serde(default)]
    pub primary_key: Vec<String>,
}

impl Table {
    /// Create a table with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Set the schema.
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Add a column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key.
    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Store type, e.g. `nvarchar(max)`.
    pub store_type: String,
    /// Whether the column accepts NULL.
    #[serde(default)]
    pub nullable: bool,
    /// Maximum length, for sized types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// Default value SQL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sql: Option<String>,
}

impl Column {
    /// Create a non-nullable column.
    pub fn new(name: impl Into<String>, store_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_type: store_type.into(),
            nullable: false,
            max_length: None,
            default_sql: None,
        }
    }

    /// Mark the column nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set the maximum length.
    pub fn max_length(mut self, length: u32) -> Self {
        self.max_length = Some(length);
        self
    }
}
