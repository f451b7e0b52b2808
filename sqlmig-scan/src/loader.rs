//! Isolated loading of compiled artifacts.
//!
//! Every artifact gets its own [`IsolatedContext`]: a private staging directory plus one
//! probe process. The artifact, its dependency manifest and its private dependencies are
//! read fully into memory and written into the staging directory, so the build output is
//! never held open and can be rebuilt while a context is alive.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::deps::{DependencyManifest, Resolution};
use crate::error::{ScanError, ScanResult};
use crate::lifecycle::ContextTracker;
use crate::probe::{ContextReport, ProbeChannel, ProbeLauncher, ProbeRequest, ProbeResponse, TypeCatalog};

/// Shared handle to an isolated context.
pub type ContextHandle = Arc<IsolatedContext>;

/// A private, unloadable load context for one artifact.
pub struct IsolatedContext {
    name: String,
    artifact: PathBuf,
    collectible: bool,
    state: Mutex<ContextState>,
}

struct ContextState {
    staging: Option<TempDir>,
    channel: Option<Box<dyn ProbeChannel>>,
    unloaded: bool,
}

impl IsolatedContext {
    fn new(artifact: &Path, staging: TempDir, collectible: bool) -> Self {
        Self {
            name: file_stem(artifact),
            artifact: artifact.to_path_buf(),
            collectible,
            state: Mutex::new(ContextState {
                staging: Some(staging),
                channel: None,
                unloaded: false,
            }),
        }
    }

    /// Context name (artifact stem).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Artifact this context was created for.
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Whether unloading releases the staged copies.
    pub fn is_collectible(&self) -> bool {
        self.collectible
    }

    /// Whether the context has been unloaded.
    pub fn is_unloaded(&self) -> bool {
        self.state.lock().unloaded
    }

    /// Staging directory, while the context is loaded.
    pub fn staging_dir(&self) -> Option<PathBuf> {
        self.state
            .lock()
            .staging
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
    }

    /// Whether a probe is attached.
    pub fn has_probe(&self) -> bool {
        self.state.lock().channel.is_some()
    }

    /// Stop the probe and release the staging directory.
    ///
    /// Returns `Ok(false)` if the context was already unloaded.
    pub fn unload(&self) -> ScanResult<bool> {
        let mut state = self.state.lock();
        if state.unloaded {
            return Ok(false);
        }
        state.unloaded = true;

        let shutdown = match state.channel.take() {
            Some(mut channel) => channel.shutdown(),
            None => Ok(()),
        };

        let released = match state.staging.take() {
            Some(staging) if self.collectible => staging.close().map_err(ScanError::from),
            Some(staging) => {
                let kept = staging.keep();
                info!(
                    "Keeping staged copy of {} at {} (context is not collectible)",
                    self.name,
                    kept.display()
                );
                Ok(())
            }
            None => Ok(()),
        };

        debug!("Unloaded context {}", self.name);
        match (shutdown, released) {
            (Ok(()), Ok(())) => Ok(true),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(e), Err(release)) => {
                warn!("Failed to remove staged copy of {}: {}", self.name, release);
                Err(e)
            }
        }
    }

    fn attach(&self, channel: Box<dyn ProbeChannel>) -> ScanResult<()> {
        let mut state = self.state.lock();
        if state.unloaded {
            return Err(ScanError::ContextUnloaded(self.artifact.clone()));
        }
        if state.channel.is_some() {
            return Err(ScanError::probe(format!("context {} already hosts a module", self.name)));
        }
        state.channel = Some(channel);
        Ok(())
    }

    fn call(&self, request: &ProbeRequest) -> ScanResult<ProbeResponse> {
        let mut state = self.state.lock();
        let channel = state
            .channel
            .as_mut()
            .ok_or_else(|| ScanError::ContextUnloaded(self.artifact.clone()))?;
        channel.call(request)?.into_result()
    }
}

impl std::fmt::Debug for IsolatedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedContext")
            .field("name", &self.name)
            .field("artifact", &self.artifact)
            .field("collectible", &self.collectible)
            .field("unloaded", &self.is_unloaded())
            .finish()
    }
}

impl Drop for IsolatedContext {
    fn drop(&mut self) {
        if let Err(e) = self.unload() {
            warn!("Failed to unload context {}: {}", self.name, e);
        }
    }
}

/// A module loaded into an isolated context.
///
/// Holds its context alive; all requests go to the context's probe.
#[derive(Debug, Clone)]
pub struct ModuleHandle {
    context: ContextHandle,
    module: String,
}

impl ModuleHandle {
    /// Module name reported by the probe.
    pub fn module_name(&self) -> &str {
        &self.module
    }

    /// Owning context.
    pub fn context(&self) -> &ContextHandle {
        &self.context
    }

    /// List loadable types.
    pub fn describe(&self) -> ScanResult<TypeCatalog> {
        match self.context.call(&ProbeRequest::Describe)? {
            ProbeResponse::Types(catalog) => Ok(catalog),
            other => Err(other.unexpected("describe")),
        }
    }

    /// Instantiate `factory_type` and report on its context.
    pub fn inspect(&self, factory_type: &str, args: &[String]) -> ScanResult<ContextReport> {
        let request = ProbeRequest::Inspect {
            factory_type: factory_type.to_string(),
            args: args.to_vec(),
        };
        match self.context.call(&request)? {
            ProbeResponse::Context(report) => Ok(report),
            other => Err(other.unexpected("inspect")),
        }
    }

    /// Apply pending migrations up to `migration`, or all.
    pub fn apply_migration(
        &self,
        factory_type: &str,
        migration: Option<&str>,
    ) -> ScanResult<Option<String>> {
        let request = ProbeRequest::ApplyMigration {
            factory_type: factory_type.to_string(),
            migration: migration.map(str::to_string),
        };
        match self.context.call(&request)? {
            ProbeResponse::Applied { migration } => Ok(migration),
            other => Err(other.unexpected("apply_migration")),
        }
    }

    /// Delete the context's database.
    pub fn drop_database(&self, factory_type: &str) -> ScanResult<bool> {
        let request = ProbeRequest::DropDatabase {
            factory_type: factory_type.to_string(),
        };
        match self.context.call(&request)? {
            ProbeResponse::Dropped { existed } => Ok(existed),
            other => Err(other.unexpected("drop_database")),
        }
    }
}

/// Creates isolated contexts and loads artifacts into them.
pub struct IsolatedLoader {
    config: LoaderConfig,
    launcher: Arc<dyn ProbeLauncher>,
    tracker: ContextTracker,
    collectible: bool,
}

impl IsolatedLoader {
    /// Create a loader registering its contexts with `tracker`.
    pub fn new(config: LoaderConfig, launcher: Arc<dyn ProbeLauncher>, tracker: ContextTracker) -> Self {
        let collectible = config.collectible.unwrap_or_else(|| !debugger_attached());
        if !collectible {
            info!("Isolated contexts are not collectible; staged copies will be kept");
        }

        Self {
            config,
            launcher,
            tracker,
            collectible,
        }
    }

    /// Loader configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Registry of contexts created by this loader.
    pub fn tracker(&self) -> &ContextTracker {
        &self.tracker
    }

    /// Create a context for `artifact`.
    pub fn create_context(&self, artifact: &Path) -> Option<ContextHandle> {
        match self.try_create_context(artifact) {
            Ok(context) => Some(context),
            Err(e) => {
                debug!("Could not create context for {}: {}", artifact.display(), e);
                None
            }
        }
    }

    /// Create a context for `artifact`, reporting failures.
    pub fn try_create_context(&self, artifact: &Path) -> ScanResult<ContextHandle> {
        let staging = tempfile::Builder::new().prefix("sqlmig-").tempdir()?;
        debug!(
            "Created context for {} staged at {}",
            artifact.display(),
            staging.path().display()
        );

        let context = Arc::new(IsolatedContext::new(artifact, staging, self.collectible));
        self.tracker.track(&context);
        Ok(context)
    }

    /// Load `artifact` into `context`. Any failure yields `None`.
    pub fn load_isolated(&self, context: &ContextHandle, artifact: &Path) -> Option<ModuleHandle> {
        match self.try_load_isolated(context, artifact) {
            Ok(handle) => Some(handle),
            Err(e) => {
                debug!("Could not load {}: {}", artifact.display(), e);
                None
            }
        }
    }

    /// Load `artifact` into `context`, reporting failures.
    pub fn try_load_isolated(&self, context: &ContextHandle, artifact: &Path) -> ScanResult<ModuleHandle> {
        let staging = context
            .staging_dir()
            .ok_or_else(|| ScanError::ContextUnloaded(artifact.to_path_buf()))?;

        let manifest_path = DependencyManifest::path_for(artifact);
        let manifest = DependencyManifest::load(&manifest_path)?;

        let artifact_dir = artifact.parent().unwrap_or_else(|| Path::new("."));
        let root = file_stem(artifact);
        let dependencies = manifest.resolve(&root, artifact_dir, &self.config)?;

        let staged_artifact = stage(artifact, &staging)?;
        stage(&manifest_path, &staging)?;

        let mut private_modules = Vec::new();
        for dependency in &dependencies {
            match &dependency.resolution {
                Resolution::Private(path) => private_modules.push(stage(path, &staging)?),
                Resolution::Host => debug!("{} resolves to the host", dependency.module),
                Resolution::Missing => debug!(
                    "{} {} is listed but not present next to {}",
                    dependency.module,
                    dependency.version,
                    artifact.display()
                ),
            }
        }

        let mut channel = self.launcher.launch(&staging)?;
        let request = ProbeRequest::Load {
            artifact: staged_artifact,
            private_modules,
            shared_modules: self.config.shared_modules.clone(),
        };

        let module = match channel.call(&request).and_then(ProbeResponse::into_result) {
            Ok(ProbeResponse::Loaded { module }) => module,
            Ok(other) => {
                let _ = channel.shutdown();
                return Err(other.unexpected("load"));
            }
            Err(e) => {
                let _ = channel.shutdown();
                return Err(e);
            }
        };

        context.attach(channel)?;
        debug!("Loaded {} into context {}", module, context.name());

        Ok(ModuleHandle {
            context: Arc::clone(context),
            module,
        })
    }

    /// Unload a context now.
    pub fn unload(&self, context: &ContextHandle) -> ScanResult<bool> {
        context.unload()
    }
}

/// Copy `source` into `staging` through memory; returns the staged path.
fn stage(source: &Path, staging: &Path) -> ScanResult<PathBuf> {
    let file_name = source
        .file_name()
        .ok_or_else(|| ScanError::not_found(source.display().to_string()))?;
    let bytes = fs::read(source)?;
    let target = staging.join(file_name);
    fs::write(&target, bytes)?;
    Ok(target)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Whether a debugger is tracing this process.
pub fn debugger_attached() -> bool {
    #[cfg(target_os = "linux")]
    {
        fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| {
                status
                    .lines()
                    .find_map(|line| line.strip_prefix("TracerPid:"))
                    .and_then(|pid| pid.trim().parse::<u32>().ok())
            })
            .is_some_and(|pid| pid != 0)
    }

    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
