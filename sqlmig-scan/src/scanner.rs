//! Solution scanning: locate, inspect and assemble the solution graph.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info};

use crate::config::ScannerConfig;
use crate::error::{ScanError, ScanResult};
use crate::inspector::SchemaInspector;
use crate::lifecycle::{ContextTracker, UnloadReport};
use crate::loader::IsolatedLoader;
use crate::locator::ProjectLocator;
use crate::model::{Project, SchemaContextDescriptor, Solution};
use crate::probe::{ProbeLauncher, ProcessLauncher};
use crate::session::SchemaContextSession;

/// Scans a solution for schema contexts and their migrations.
///
/// Every isolated context created during a scan is unloaded before the next scan starts
/// and again once the scan finishes.
pub struct SolutionScanner {
    config: ScannerConfig,
    locator: ProjectLocator,
    inspector: SchemaInspector,
    tracker: ContextTracker,
    solution: Option<Solution>,
    cancelled: Arc<AtomicBool>,
}

impl SolutionScanner {
    /// Create a scanner that launches probes as child processes.
    pub fn new(config: ScannerConfig) -> Self {
        let launcher = Arc::new(ProcessLauncher::from_config(&config.loader));
        Self::with_launcher(config, launcher)
    }

    /// Create a scanner with a custom probe launcher.
    pub fn with_launcher(config: ScannerConfig, launcher: Arc<dyn ProbeLauncher>) -> Self {
        let tracker = ContextTracker::new();
        let loader = IsolatedLoader::new(config.loader.clone(), launcher, tracker.clone());
        let inspector = SchemaInspector::new(loader, config.factory_interface.clone());

        Self {
            locator: ProjectLocator::new(&config),
            config,
            inspector,
            tracker,
            solution: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Scanner configuration.
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Flag that stops a running scan before its next project.
    pub fn cancellation(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Scan from `search_path`, or the current directory.
    ///
    /// Replaces the previous solution. Returns `None` when no solution manifest is found.
    pub fn scan(&mut self, search_path: Option<&Path>) -> Option<&Solution> {
        self.solution = None;
        self.tracker.unload_all();

        let start = match search_path {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::current_dir().ok(),
        };

        let solution = start.and_then(|start| self.discover(&start));
        self.tracker.unload_all();

        self.solution = solution;
        self.solution.as_ref()
    }

    /// Scan like [`scan`](Self::scan), reporting a cancelled scan as [`ScanError::Cancelled`].
    ///
    /// A cancelled scan keeps no solution.
    pub fn try_scan(&mut self, search_path: Option<&Path>) -> ScanResult<Option<&Solution>> {
        self.scan(search_path);

        if self.cancelled.load(Ordering::SeqCst) {
            self.solution = None;
            return Err(ScanError::Cancelled);
        }
        Ok(self.solution.as_ref())
    }

    /// Last scanned solution.
    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    /// Drop the solution and unload every context.
    pub fn unload(&mut self) -> UnloadReport {
        self.solution = None;
        self.tracker.unload_all()
    }

    /// Open a live session for a scanned context.
    pub fn open_session(&self, descriptor: &SchemaContextDescriptor) -> Option<SchemaContextSession> {
        self.inspector.open_session(descriptor)
    }

    /// Number of tracked contexts still loaded.
    pub fn tracked_contexts(&self) -> usize {
        self.tracker.live_count()
    }

    fn discover(&self, start: &Path) -> Option<Solution> {
        let started = Instant::now();

        let Some(manifest) = self.locator.find_solution_manifest(start) else {
            info!("No solution manifest found from {}", start.display());
            return None;
        };

        let root = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut solution = Solution::new(manifest);

        for project_manifest in self.locator.enumerate_project_manifests(&root) {
            if self.cancelled.load(Ordering::SeqCst) {
                info!("Scan cancelled, skipping remaining projects");
                break;
            }

            if !self.locator.is_migration_project(&project_manifest) {
                debug!("{} is not a migration project", project_manifest.display());
                continue;
            }

            let Some(artifact) = self.locator.locate_artifact(&project_manifest) else {
                continue;
            };

            let descriptors = self.inspector.inspect(&project_manifest, &artifact);
            if descriptors.is_empty() {
                continue;
            }

            solution.projects.push(Project::new(project_manifest, descriptors));
        }

        info!(
            "Scanned {}: {} projects, {} contexts in {:?}",
            solution.name(),
            solution.projects.len(),
            solution.contexts().count(),
            started.elapsed()
        );

        Some(solution)
    }
}
