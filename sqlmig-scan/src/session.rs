//! Live schema-context sessions used after a scan (apply, drop, reset).

use std::collections::HashSet;

use crate::error::ScanResult;
use crate::loader::ModuleHandle;
use crate::model::{MigrationRecord, MigrationStatus};
use crate::probe::ContextReport;

/// A schema context built through its factory inside a fresh isolated context.
///
/// The session holds the only strong reference to its context, so dropping it unloads
/// the probe and releases the staged copy.
#[derive(Debug)]
pub struct SchemaContextSession {
    module: ModuleHandle,
    factory_type: String,
    context_type: String,
}

impl SchemaContextSession {
    pub(crate) fn new(
        module: ModuleHandle,
        factory_type: impl Into<String>,
        context_type: impl Into<String>,
    ) -> Self {
        Self {
            module,
            factory_type: factory_type.into(),
            context_type: context_type.into(),
        }
    }

    /// Factory type name.
    pub fn factory_type(&self) -> &str {
        &self.factory_type
    }

    /// Context type name.
    pub fn context_type(&self) -> &str {
        &self.context_type
    }

    /// Fresh report from the context.
    pub fn report(&self) -> ScanResult<ContextReport> {
        self.module.inspect(&self.factory_type, &[])
    }

    /// Target database name.
    pub fn database_name(&self) -> ScanResult<Option<String>> {
        Ok(self.report()?.database_name)
    }

    /// Migrations with their current status.
    pub fn migrations(&self) -> ScanResult<Vec<MigrationRecord>> {
        let report = self.report()?;
        let applied: HashSet<&str> = report.applied.iter().map(String::as_str).collect();
        let pending: HashSet<&str> = report.pending.iter().map(String::as_str).collect();

        Ok(report
            .migrations
            .iter()
            .map(|id| MigrationRecord::new(id, MigrationStatus::from_sets(id, &applied, &pending)))
            .collect())
    }

    /// Identifiers of migrations not yet applied, in order.
    pub fn pending_migrations(&self) -> ScanResult<Vec<String>> {
        Ok(self.report()?.pending)
    }

    /// Find a pending migration by full identifier or name suffix (case-insensitive).
    pub fn find_pending(&self, name: &str) -> ScanResult<Option<String>> {
        let pending = self.pending_migrations()?;
        Ok(match_migration(&pending, name).map(str::to_string))
    }

    /// Apply pending migrations up to `migration`, or all of them.
    ///
    /// Returns the last migration applied, if any.
    pub fn apply_migration(&self, migration: Option<&str>) -> ScanResult<Option<String>> {
        self.module.apply_migration(&self.factory_type, migration)
    }

    /// Delete the database. Returns whether one existed.
    pub fn drop_database(&self) -> ScanResult<bool> {
        self.module.drop_database(&self.factory_type)
    }

    /// Unload the session's context now.
    pub fn close(self) -> ScanResult<bool> {
        self.module.context().unload()
    }
}

/// Match `name` against migration identifiers: exact first, then suffix.
pub fn match_migration<'a>(candidates: &'a [String], name: &str) -> Option<&'a str> {
    let wanted = name.to_lowercase();

    candidates
        .iter()
        .find(|id| id.to_lowercase() == wanted)
        .or_else(|| candidates.iter().find(|id| id.to_lowercase().ends_with(&wanted)))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_migration() {
        let pending = vec![
            "20251213102558_AddFirstName".to_string(),
            "20251214090000_AddUsername".to_string(),
        ];

        assert_eq!(
            match_migration(&pending, "addusername"),
            Some("20251214090000_AddUsername")
        );
        assert_eq!(
            match_migration(&pending, "20251213102558_AddFirstName"),
            Some("20251213102558_AddFirstName")
        );
        assert_eq!(match_migration(&pending, "RemoveLastName"), None);
    }

    #[test]
    fn test_match_prefers_exact() {
        let pending = vec!["20251213102558_Name".to_string(), "Name".to_string()];
        assert_eq!(match_migration(&pending, "name"), Some("Name"));
    }
}
