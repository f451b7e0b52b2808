//! Discovery of schema contexts inside a loaded artifact.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::classify::classify;
use crate::error::ScanResult;
use crate::loader::{IsolatedLoader, ModuleHandle};
use crate::model::{MigrationRecord, MigrationStatus, PendingChangeRecord, SchemaContextDescriptor};
use crate::probe::{ContextReport, TypeCatalog};
use crate::session::SchemaContextSession;

/// A design-time factory and the schema context it builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryBinding {
    /// Factory type name.
    pub factory_type: String,
    /// Context type name (first generic argument of the factory interface).
    pub context_type: String,
}

/// Loads artifacts and turns their factories into schema-context descriptors.
pub struct SchemaInspector {
    loader: IsolatedLoader,
    factory_interface: String,
}

impl SchemaInspector {
    /// Create an inspector matching factories by `factory_interface` prefix.
    pub fn new(loader: IsolatedLoader, factory_interface: impl Into<String>) -> Self {
        Self {
            loader,
            factory_interface: factory_interface.into(),
        }
    }

    /// The underlying loader.
    pub fn loader(&self) -> &IsolatedLoader {
        &self.loader
    }

    /// Describe every schema context in `artifact`.
    ///
    /// Load and capability-probe failures yield an empty list and one warning.
    pub fn inspect(&self, project_manifest: &Path, artifact: &Path) -> Vec<SchemaContextDescriptor> {
        let (module, catalog) = match self.load_and_describe(artifact) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(
                    "Skipping {}: could not inspect {}: {}",
                    project_manifest.display(),
                    artifact.display(),
                    e
                );
                return Vec::new();
            }
        };

        for message in &catalog.load_errors {
            debug!("Partial type load in {}: {}", artifact.display(), message);
        }

        let descriptors: Vec<_> = self
            .find_factory_types(&catalog)
            .into_iter()
            .map(|binding| self.describe_context(&module, artifact, binding))
            .collect();

        debug!(
            "{} schema contexts in {}",
            descriptors.len(),
            artifact.display()
        );
        descriptors
    }

    /// Concrete types implementing the factory interface, without duplicates.
    pub fn find_factory_types(&self, catalog: &TypeCatalog) -> Vec<FactoryBinding> {
        let mut seen = HashSet::new();

        catalog
            .types
            .iter()
            .filter(|t| t.is_concrete())
            .filter_map(|t| {
                let interface = t.find_interface(&self.factory_interface)?;
                let Some(context_type) = interface.type_arguments.first() else {
                    debug!("{} implements {} without a type argument", t.full_name, interface.name);
                    return None;
                };
                Some(FactoryBinding {
                    factory_type: t.full_name.clone(),
                    context_type: context_type.clone(),
                })
            })
            .filter(|b| seen.insert(b.factory_type.clone()))
            .collect()
    }

    /// Load a descriptor's artifact afresh and open a session on its context.
    pub fn open_session(&self, descriptor: &SchemaContextDescriptor) -> Option<SchemaContextSession> {
        match self.try_open_session(descriptor) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(
                    "Could not open {} from {}: {}",
                    descriptor.short_name(),
                    descriptor.artifact_path.display(),
                    e
                );
                None
            }
        }
    }

    fn try_open_session(&self, descriptor: &SchemaContextDescriptor) -> ScanResult<SchemaContextSession> {
        let artifact = &descriptor.artifact_path;
        let context = self.loader.try_create_context(artifact)?;
        let module = self.loader.try_load_isolated(&context, artifact)?;
        Ok(SchemaContextSession::new(
            module,
            descriptor.factory_type.clone(),
            descriptor.context_type.clone(),
        ))
    }

    fn load_and_describe(&self, artifact: &Path) -> ScanResult<(ModuleHandle, TypeCatalog)> {
        let context = self.loader.try_create_context(artifact)?;
        let module = self.loader.try_load_isolated(&context, artifact)?;
        let catalog = module.describe()?;
        Ok((module, catalog))
    }

    fn describe_context(
        &self,
        module: &ModuleHandle,
        artifact: &Path,
        binding: FactoryBinding,
    ) -> SchemaContextDescriptor {
        let mut descriptor =
            SchemaContextDescriptor::new(artifact, binding.factory_type, binding.context_type);

        match module.inspect(&descriptor.factory_type, &[]) {
            Ok(report) => populate(&mut descriptor, report),
            Err(e) => debug!("Factory {} failed: {}", descriptor.factory_type, e),
        }

        descriptor
    }
}

fn populate(descriptor: &mut SchemaContextDescriptor, report: ContextReport) {
    let ContextReport {
        migrations,
        applied,
        pending,
        changes,
        ..
    } = report;

    let applied: HashSet<&str> = applied.iter().map(String::as_str).collect();
    let pending: HashSet<&str> = pending.iter().map(String::as_str).collect();

    descriptor.migrations = migrations
        .iter()
        .map(|id| MigrationRecord::new(id, MigrationStatus::from_sets(id, &applied, &pending)))
        .collect();

    descriptor.pending_changes = changes
        .into_entries()
        .iter()
        .map(classify)
        .map(|c| PendingChangeRecord::new(c.description, c.destructive))
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DESIGN_TIME_FACTORY_INTERFACE, LoaderConfig};
    use crate::error::ScanError;
    use crate::lifecycle::ContextTracker;
    use crate::probe::{InProcessLauncher, InterfaceRef, ModelChanges, TypeInfo};
    use std::sync::Arc;

    fn inspector() -> SchemaInspector {
        let launcher = InProcessLauncher::new(|_| Err(ScanError::probe("unused")));
        let loader = IsolatedLoader::new(
            LoaderConfig {
                collectible: Some(true),
                ..LoaderConfig::default()
            },
            Arc::new(launcher),
            ContextTracker::new(),
        );
        SchemaInspector::new(loader, DESIGN_TIME_FACTORY_INTERFACE)
    }

    fn factory(name: &str, context: &str) -> TypeInfo {
        TypeInfo::class(name).implementing(InterfaceRef::new(DESIGN_TIME_FACTORY_INTERFACE, [context]))
    }

    #[test]
    fn test_find_factory_types() {
        let mut abstract_factory = factory("App.BaseFactory", "App.BaseContext");
        abstract_factory.is_abstract = true;

        let catalog = TypeCatalog {
            types: vec![
                factory("App.TestDbContextFactory", "App.TestDbContext"),
                abstract_factory,
                TypeInfo::class("App.Person"),
                factory("App.TestDbContextFactory", "App.TestDbContext"),
                TypeInfo::class("App.Bare").implementing(InterfaceRef::new(
                    DESIGN_TIME_FACTORY_INTERFACE,
                    Vec::<String>::new(),
                )),
            ],
            load_errors: vec![],
        };

        let bindings = inspector().find_factory_types(&catalog);
        assert_eq!(bindings, vec![FactoryBinding {
            factory_type: "App.TestDbContextFactory".to_string(),
            context_type: "App.TestDbContext".to_string(),
        }]);
    }

    #[test]
    fn test_populate_statuses_and_changes() {
        let mut descriptor = SchemaContextDescriptor::new("/x/App.dll", "App.F", "App.Ctx");
        let report = ContextReport {
            context_type: "App.Ctx".to_string(),
            migrations: vec![
                "20251213102558_Init".to_string(),
                "20251214090000_AddUsername".to_string(),
                "Legacy".to_string(),
            ],
            applied: vec!["20251213102558_Init".to_string()],
            pending: vec!["20251214090000_AddUsername".to_string()],
            changes: ModelChanges::Models {
                snapshot: None,
                model: crate::relational::RelationalModel::new()
                    .with_table(crate::relational::Table::new("Person")),
            },
            ..ContextReport::default()
        };

        populate(&mut descriptor, report);

        let statuses: Vec<_> = descriptor.migrations.iter().map(|m| m.status).collect();
        assert_eq!(statuses, vec![
            MigrationStatus::Applied,
            MigrationStatus::Pending,
            MigrationStatus::Unknown
        ]);
        assert!(descriptor.migrations[2].is_malformed());
        assert_eq!(descriptor.pending_changes.len(), 1);
        assert_eq!(descriptor.pending_changes[0].description, "Create Table 'Person'");
    }

    #[test]
    fn test_unbuilt_artifact_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let descriptors = inspector().inspect(
            &dir.path().join("App.csproj"),
            &dir.path().join("bin/Debug/net9.0/App.dll"),
        );
        assert!(descriptors.is_empty());
    }
}
