//! Tracking and unloading of isolated contexts.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::loader::{ContextHandle, IsolatedContext};

/// Outcome of [`ContextTracker::unload_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnloadReport {
    /// Contexts unloaded by this call.
    pub unloaded: usize,
    /// Of those, how many released their staged copies.
    pub released: usize,
}

impl UnloadReport {
    /// Whether nothing needed unloading.
    pub fn is_empty(&self) -> bool {
        self.unloaded == 0
    }
}

/// Weak registry of every context created by a loader.
///
/// Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct ContextTracker {
    contexts: Arc<Mutex<Vec<Weak<IsolatedContext>>>>,
}

impl ContextTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a context without keeping it alive.
    pub fn track(&self, context: &ContextHandle) {
        self.contexts.lock().push(Arc::downgrade(context));
    }

    /// Number of tracked contexts that are still alive and loaded.
    pub fn live_count(&self) -> usize {
        self.contexts
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|c| !c.is_unloaded())
            .count()
    }

    /// Unload every live context and clear the registry.
    pub fn unload_all(&self) -> UnloadReport {
        let tracked = std::mem::take(&mut *self.contexts.lock());
        let mut report = UnloadReport::default();

        if tracked.is_empty() {
            return report;
        }

        for context in tracked.iter().filter_map(Weak::upgrade) {
            match context.unload() {
                Ok(true) => {
                    report.unloaded += 1;
                    if context.is_collectible() {
                        report.released += 1;
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to unload context for {}: {}", context.name(), e);
                    report.unloaded += 1;
                }
            }
        }

        debug!(
            "Unloaded {} of {} tracked contexts ({} released)",
            report.unloaded,
            tracked.len(),
            report.released
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use crate::loader::IsolatedLoader;
    use crate::probe::InProcessLauncher;
    use crate::error::ScanError;
    use std::path::Path;

    fn loader(tracker: &ContextTracker, collectible: bool) -> IsolatedLoader {
        let config = LoaderConfig {
            collectible: Some(collectible),
            ..LoaderConfig::default()
        };
        let launcher = InProcessLauncher::new(|_| Err(ScanError::probe("no probe")));
        IsolatedLoader::new(config, Arc::new(launcher), tracker.clone())
    }

    #[test]
    fn test_empty_tracker_is_noop() {
        let tracker = ContextTracker::new();
        assert!(tracker.unload_all().is_empty());
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn test_unload_all_releases_staging() {
        let tracker = ContextTracker::new();
        let loader = loader(&tracker, true);

        let a = loader.create_context(Path::new("/build/A.dll")).unwrap();
        let b = loader.create_context(Path::new("/build/B.dll")).unwrap();
        let staging = a.staging_dir().unwrap();
        assert!(staging.exists());
        assert_eq!(tracker.live_count(), 2);

        let report = tracker.unload_all();
        assert_eq!(report, UnloadReport {
            unloaded: 2,
            released: 2
        });
        assert!(a.is_unloaded() && b.is_unloaded());
        assert!(!staging.exists());

        // Second call has nothing left to do
        assert!(tracker.unload_all().is_empty());
    }

    #[test]
    fn test_dropped_contexts_are_skipped() {
        let tracker = ContextTracker::new();
        let loader = loader(&tracker, true);

        let context = loader.create_context(Path::new("/build/A.dll")).unwrap();
        let staging = context.staging_dir().unwrap();
        drop(context);

        assert!(!staging.exists());
        assert!(tracker.unload_all().is_empty());
    }

    #[test]
    fn test_non_collectible_keeps_staging() {
        let tracker = ContextTracker::new();
        let loader = loader(&tracker, false);

        let context = loader.create_context(Path::new("/build/A.dll")).unwrap();
        let staging = context.staging_dir().unwrap();

        let report = tracker.unload_all();
        assert_eq!(report.unloaded, 1);
        assert_eq!(report.released, 0);
        assert!(staging.exists());

        std::fs::remove_dir_all(staging).unwrap();
    }
}
