//! The scanned solution graph.
//!
//! Everything here is plain data. Type identifiers are kept as strings because the
//! isolated context that produced them is unloaded as soon as the scan finishes.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

/// Timestamp format of the migration identifier prefix.
pub const MIGRATION_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Root of a scan: one solution manifest and the projects discovered beneath it.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    /// Identity for this scan only.
    pub id: Uuid,
    /// Path to the solution manifest.
    pub manifest: PathBuf,
    /// Projects in discovery order.
    pub projects: Vec<Project>,
}

impl Solution {
    /// Create an empty solution for a manifest.
    pub fn new(manifest: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            manifest: manifest.into(),
            projects: Vec::new(),
        }
    }

    /// Manifest file name.
    pub fn name(&self) -> String {
        file_name(&self.manifest)
    }

    /// Directory containing the manifest.
    pub fn directory(&self) -> &Path {
        self.manifest.parent().unwrap_or_else(|| Path::new("."))
    }

    /// All schema contexts with their owning project, in discovery order.
    pub fn contexts(&self) -> impl Iterator<Item = (&Project, &SchemaContextDescriptor)> {
        self.projects
            .iter()
            .flat_map(|p| p.descriptors.iter().map(move |d| (p, d)))
    }

    /// Find a schema context by its short type name (case-insensitive).
    pub fn find_context(&self, short_name: &str) -> Option<(&Project, &SchemaContextDescriptor)> {
        self.contexts()
            .find(|(_, d)| d.short_name().eq_ignore_ascii_case(short_name))
    }

    /// Whether any context has at least one recorded migration.
    pub fn has_migrations(&self) -> bool {
        self.contexts().any(|(_, d)| !d.migrations.is_empty())
    }
}

/// A migration-bearing project.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    /// Identity for this scan only.
    pub id: Uuid,
    /// Path to the project manifest.
    pub manifest: PathBuf,
    /// Schema contexts in discovery order.
    pub descriptors: Vec<SchemaContextDescriptor>,
}

impl Project {
    /// Create a project with its discovered descriptors.
    pub fn new(manifest: impl Into<PathBuf>, descriptors: Vec<SchemaContextDescriptor>) -> Self {
        Self {
            id: Uuid::new_v4(),
            manifest: manifest.into(),
            descriptors,
        }
    }

    /// Project name (manifest stem).
    pub fn name(&self) -> String {
        self.manifest
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory containing the manifest.
    pub fn directory(&self) -> &Path {
        self.manifest.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// One schema context found through its design-time factory.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaContextDescriptor {
    /// Identity for this scan only.
    pub id: Uuid,
    /// Compiled artifact the factory lives in.
    pub artifact_path: PathBuf,
    /// Fully-qualified factory type name.
    pub factory_type: String,
    /// Fully-qualified schema-context type name.
    pub context_type: String,
    /// Recorded migrations in the order the artifact lists them.
    pub migrations: Vec<MigrationRecord>,
    /// Model changes not yet captured by a migration.
    pub pending_changes: Vec<PendingChangeRecord>,
}

impl SchemaContextDescriptor {
    /// Create a descriptor with no migrations or changes.
    pub fn new(
        artifact_path: impl Into<PathBuf>,
        factory_type: impl Into<String>,
        context_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact_path: artifact_path.into(),
            factory_type: factory_type.into(),
            context_type: context_type.into(),
            migrations: Vec::new(),
            pending_changes: Vec::new(),
        }
    }

    /// Last segment of the context type name, as the migration tool expects it.
    pub fn short_name(&self) -> &str {
        self.context_type
            .rsplit('.')
            .next()
            .unwrap_or(&self.context_type)
    }

    /// Whether any pending change would lose data.
    pub fn has_destructive_changes(&self) -> bool {
        self.pending_changes.iter().any(|c| c.destructive)
    }

    /// Migrations with the given status.
    pub fn migrations_with_status(
        &self,
        status: MigrationStatus,
    ) -> impl Iterator<Item = &MigrationRecord> {
        self.migrations.iter().filter(move |m| m.status == status)
    }
}

/// State of a migration against the target database at scan time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MigrationStatus {
    /// Recorded as applied in the database.
    Applied,
    /// Known to the artifact and not yet applied.
    Pending,
    /// Neither; typically the database could not be reached.
    Unknown,
}

impl MigrationStatus {
    /// Status of `id` given the applied and pending sets.
    pub fn from_sets(id: &str, applied: &HashSet<&str>, pending: &HashSet<&str>) -> Self {
        if applied.contains(id) {
            Self::Applied
        } else if pending.contains(id) {
            Self::Pending
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "Applied"),
            Self::Pending => write!(f, "Pending"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A recorded migration.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRecord {
    /// Identity for this scan only.
    pub id: Uuid,
    /// Full identifier, e.g. `20251213102558_AddFirstName`.
    pub full_name: String,
    /// Name part after the timestamp, or the raw identifier if it did not parse.
    pub name: String,
    /// Creation time from the identifier prefix; `None` for malformed identifiers.
    pub created_on: Option<NaiveDateTime>,
    /// Status at scan time.
    pub status: MigrationStatus,
    /// Only populated when tracked independently.
    pub applied_on: Option<NaiveDateTime>,
}

impl MigrationRecord {
    /// Build a record from its full identifier.
    pub fn new(full_name: impl Into<String>, status: MigrationStatus) -> Self {
        let full_name = full_name.into();
        let (created_on, name) = match parse_migration_id(&full_name) {
            Some((created_on, name)) => (Some(created_on), name.to_string()),
            None => (None, full_name.clone()),
        };

        Self {
            id: Uuid::new_v4(),
            full_name,
            name,
            created_on,
            status,
            applied_on: None,
        }
    }

    /// Whether the identifier lacked a parseable timestamp prefix.
    pub fn is_malformed(&self) -> bool {
        self.created_on.is_none()
    }
}

/// A model change not yet captured by a migration.
#[derive(Debug, Clone, Serialize)]
pub struct PendingChangeRecord {
    /// Identity for this scan only.
    pub id: Uuid,
    /// Human-readable description.
    pub description: String,
    /// Whether applying the change can lose data.
    pub destructive: bool,
}

impl PendingChangeRecord {
    /// Create a change record.
    pub fn new(description: impl Into<String>, destructive: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            destructive,
        }
    }
}

/// Split a migration identifier into its timestamp and name.
///
/// Expected format: `yyyyMMddHHmmss_Name`. Returns `None` when there is no `_` or the
/// prefix is not a valid timestamp.
pub fn parse_migration_id(id: &str) -> Option<(NaiveDateTime, &str)> {
    let (prefix, name) = id.split_once('_')?;

    if prefix.len() != 14 || !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let created_on = NaiveDateTime::parse_from_str(prefix, MIGRATION_TIMESTAMP_FORMAT).ok()?;
    Some((created_on, name))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
