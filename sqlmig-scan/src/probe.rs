//! Probe protocol and channels.
//!
//! A probe is the helper that actually hosts the schema-context framework for one staged
//! artifact. The host talks to it with line-delimited JSON: every request line is
//! answered by exactly one response line.
//!
//! ```text
//! → {"op":"load","artifact":"App.Data.dll","private_modules":[...],"shared_modules":[...]}
//! ← {"status":"loaded","module":"App.Data"}
//! → {"op":"describe"}
//! ← {"status":"types","types":[...],"load_errors":[]}
//! → {"op":"inspect","factory_type":"App.Data.TestDbContextFactory","args":[]}
//! ← {"status":"context","context_type":"App.Data.TestDbContext",...}
//! → {"op":"shutdown"}
//! ← {"status":"ack"}
//! ```

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::LoaderConfig;
use crate::diff::{DiffEntry, ModelDiffer};
use crate::error::{ScanError, ScanResult};
use crate::relational::RelationalModel;

/// Host → probe request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ProbeRequest {
    /// Load the staged artifact.
    Load {
        /// Staged artifact path.
        artifact: PathBuf,
        /// Staged private modules.
        #[serde(default)]
        private_modules: Vec<PathBuf>,
        /// Module names that resolve to the probe's own copies.
        #[serde(default)]
        shared_modules: Vec<String>,
    },
    /// List the loadable types of the artifact.
    Describe,
    /// Instantiate a factory and report its context.
    Inspect {
        /// Factory type name.
        factory_type: String,
        /// Factory arguments.
        #[serde(default)]
        args: Vec<String>,
    },
    /// Apply pending migrations up to `migration`, or all of them.
    ApplyMigration {
        /// Factory type name.
        factory_type: String,
        /// Target migration identifier.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        migration: Option<String>,
    },
    /// Delete the context's database.
    DropDatabase {
        /// Factory type name.
        factory_type: String,
    },
    /// Stop the probe.
    Shutdown,
}

/// Probe → host response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeResponse {
    /// Artifact loaded.
    Loaded {
        /// Loaded module name.
        module: String,
    },
    /// Type catalog.
    Types(TypeCatalog),
    /// Context report.
    Context(ContextReport),
    /// Migrations applied.
    Applied {
        /// Last migration applied, if any were pending.
        #[serde(default)]
        migration: Option<String>,
    },
    /// Database dropped.
    Dropped {
        /// Whether a database existed.
        existed: bool,
    },
    /// Acknowledgement.
    Ack,
    /// Request failed.
    Error {
        /// Failure message.
        message: String,
    },
}

impl ProbeResponse {
    /// Turn an `error` response into a [`ScanError`].
    pub fn into_result(self) -> ScanResult<Self> {
        match self {
            Self::Error { message } => Err(ScanError::Probe(message)),
            other => Ok(other),
        }
    }

    fn status(&self) -> &'static str {
        match self {
            Self::Loaded { .. } => "loaded",
            Self::Types(_) => "types",
            Self::Context(_) => "context",
            Self::Applied { .. } => "applied",
            Self::Dropped { .. } => "dropped",
            Self::Ack => "ack",
            Self::Error { .. } => "error",
        }
    }

    /// Error for a response that does not answer `op`.
    pub fn unexpected(&self, op: &str) -> ScanError {
        ScanError::probe(format!("unexpected '{}' response to '{}'", self.status(), op))
    }
}

/// Types the probe could load from the artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeCatalog {
    /// Successfully loaded types.
    #[serde(default)]
    pub types: Vec<TypeInfo>,
    /// Messages for types that failed to load.
    #[serde(default)]
    pub load_errors: Vec<String>,
}

/// A loaded type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Fully-qualified name.
    pub full_name: String,
    /// Whether the type is a class.
    #[serde(default)]
    pub is_class: bool,
    /// Whether the type is abstract.
    #[serde(default)]
    pub is_abstract: bool,
    /// Implemented interfaces.
    #[serde(default)]
    pub interfaces: Vec<InterfaceRef>,
}

impl TypeInfo {
    /// Create a concrete class.
    pub fn class(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            is_class: true,
            is_abstract: false,
            interfaces: Vec::new(),
        }
    }

    /// Add an implemented interface.
    pub fn implementing(mut self, interface: InterfaceRef) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Whether the type can be instantiated.
    pub fn is_concrete(&self) -> bool {
        self.is_class && !self.is_abstract
    }

    /// First implemented interface whose name starts with `prefix`.
    pub fn find_interface(&self, prefix: &str) -> Option<&InterfaceRef> {
        self.interfaces.iter().find(|i| i.name.starts_with(prefix))
    }
}

/// A (possibly generic) interface reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceRef {
    /// Fully-qualified generic definition name.
    pub name: String,
    /// Generic arguments.
    #[serde(default)]
    pub type_arguments: Vec<String>,
}

impl InterfaceRef {
    /// Create an interface reference.
    pub fn new<I, S>(name: impl Into<String>, type_arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            type_arguments: type_arguments.into_iter().map(Into::into).collect(),
        }
    }
}

/// What a factory-built context reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextReport {
    /// Fully-qualified context type name.
    pub context_type: String,
    /// Target database name, if known.
    #[serde(default)]
    pub database_name: Option<String>,
    /// Default schema of the model.
    #[serde(default)]
    pub default_schema: Option<String>,
    /// All migrations in the artifact, in order.
    #[serde(default)]
    pub migrations: Vec<String>,
    /// Migrations recorded as applied.
    #[serde(default)]
    pub applied: Vec<String>,
    /// Migrations not yet applied.
    #[serde(default)]
    pub pending: Vec<String>,
    /// Outstanding model changes.
    #[serde(default)]
    pub changes: ModelChanges,
}

/// Outstanding model changes, either pre-diffed or as two models for the host to diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ModelChanges {
    /// Diff entries computed by the probe.
    Operations {
        /// Entries in framework order.
        #[serde(default)]
        operations: Vec<DiffEntry>,
    },
    /// Snapshot and declared model; the host computes the diff.
    Models {
        /// Last recorded snapshot; absent when no migration exists.
        #[serde(default)]
        snapshot: Option<RelationalModel>,
        /// Declared model.
        model: RelationalModel,
    },
}

impl Default for ModelChanges {
    fn default() -> Self {
        Self::Operations {
            operations: Vec::new(),
        }
    }
}

impl ModelChanges {
    /// Diff entries, computing them when the probe sent models.
    pub fn into_entries(self) -> Vec<DiffEntry> {
        match self {
            Self::Operations { operations } => operations,
            Self::Models { snapshot, model } => ModelDiffer::new(model).with_snapshot(snapshot).diff(),
        }
    }
}

/// A live connection to one probe.
pub trait ProbeChannel: Send {
    /// Send one request and wait for its response.
    fn call(&mut self, request: &ProbeRequest) -> ScanResult<ProbeResponse>;

    /// Stop the probe and wait for it to exit. Calling it again is a no-op.
    fn shutdown(&mut self) -> ScanResult<()>;
}

/// Starts probes inside a staging directory.
pub trait ProbeLauncher: Send + Sync {
    /// Launch a probe whose working directory is `staging_dir`.
    fn launch(&self, staging_dir: &Path) -> ScanResult<Box<dyn ProbeChannel>>;
}

/// Launches the probe as a child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    command: Vec<String>,
    timeout: Duration,
}

impl ProcessLauncher {
    /// Create a launcher for `command` (program first).
    pub fn new<I, S>(command: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            timeout,
        }
    }

    /// Create a launcher from loader configuration.
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.probe_command.iter().cloned(), config.probe_timeout())
    }
}

impl ProbeLauncher for ProcessLauncher {
    fn launch(&self, staging_dir: &Path) -> ScanResult<Box<dyn ProbeChannel>> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| ScanError::probe("probe command is empty"))?;

        debug!("Launching probe {} in {}", program, staging_dir.display());

        let mut child = Command::new(program)
            .args(args)
            .current_dir(staging_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScanError::probe("probe stdout unavailable"))?;

        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        if let Some(stderr) = child.stderr.take() {
            let program = program.clone();
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    debug!(probe = %program, "{}", line);
                }
            });
        }

        Ok(Box::new(ChildChannel {
            child,
            stdin,
            lines,
            timeout: self.timeout,
            finished: false,
        }))
    }
}

/// Channel to a probe child process.
struct ChildChannel {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Receiver<std::io::Result<String>>,
    timeout: Duration,
    finished: bool,
}

impl ChildChannel {
    fn send(&mut self, request: &ProbeRequest) -> ScanResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ScanError::probe("probe input is closed"))?;
        let line = serde_json::to_string(request)?;
        trace!("→ probe: {}", line);
        writeln!(stdin, "{line}")?;
        stdin.flush()?;
        Ok(())
    }

    /// Next response line. Output that is not a response (banners, runtime notices) is
    /// skipped so it cannot be mistaken for the answer to a later request.
    fn receive(&mut self) -> ScanResult<ProbeResponse> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.lines.recv_timeout(remaining) {
                Ok(Ok(line)) if line.trim().is_empty() => continue,
                Ok(Ok(line)) => {
                    trace!("← probe: {}", line);
                    match serde_json::from_str(&line) {
                        Ok(response) => return Ok(response),
                        Err(e) => debug!("Ignoring probe output that is not a response ({}): {}", e, line),
                    }
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(RecvTimeoutError::Timeout) => {
                    self.kill();
                    return Err(ScanError::ProbeTimeout(self.timeout.as_secs()));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ScanError::probe("probe exited without responding"));
                }
            }
        }
    }

    fn kill(&mut self) {
        self.stdin = None;
        if let Err(e) = self.child.kill() {
            debug!("Failed to kill probe: {}", e);
        }
        let _ = self.child.wait();
        self.finished = true;
    }
}

impl ProbeChannel for ChildChannel {
    fn call(&mut self, request: &ProbeRequest) -> ScanResult<ProbeResponse> {
        if self.finished {
            return Err(ScanError::probe("probe has exited"));
        }
        self.send(request)?;
        self.receive()
    }

    fn shutdown(&mut self) -> ScanResult<()> {
        if self.finished {
            return Ok(());
        }

        if self.send(&ProbeRequest::Shutdown).is_err() {
            debug!("Probe input already closed");
        }
        self.stdin = None;

        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                debug!("Probe exited with {}", status);
                self.finished = true;
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!("Probe did not exit in time, killing it");
                self.kill();
                return Err(ScanError::ProbeTimeout(self.timeout.as_secs()));
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for ChildChannel {
    fn drop(&mut self) {
        if !self.finished {
            self.kill();
        }
    }
}

/// Implemented by probe hosts; driven by [`serve`] or [`InProcessChannel`].
pub trait ProbeHandler: Send {
    /// Load the staged artifact and return its module name.
    fn load(
        &mut self,
        artifact: &Path,
        private_modules: &[PathBuf],
        shared_modules: &[String],
    ) -> ScanResult<String>;

    /// List loadable types.
    fn describe(&mut self) -> ScanResult<TypeCatalog>;

    /// Build a context through `factory_type` and report on it.
    fn inspect(&mut self, factory_type: &str, args: &[String]) -> ScanResult<ContextReport>;

    /// Apply pending migrations up to `migration`, or all; returns the last one applied.
    fn apply_migration(
        &mut self,
        factory_type: &str,
        migration: Option<&str>,
    ) -> ScanResult<Option<String>>;

    /// Delete the context's database; returns whether it existed.
    fn drop_database(&mut self, factory_type: &str) -> ScanResult<bool>;
}

/// Answer one request with `handler`.
pub fn dispatch(handler: &mut dyn ProbeHandler, request: &ProbeRequest) -> ProbeResponse {
    let result = match request {
        ProbeRequest::Load {
            artifact,
            private_modules,
            shared_modules,
        } => handler
            .load(artifact, private_modules, shared_modules)
            .map(|module| ProbeResponse::Loaded { module }),
        ProbeRequest::Describe => handler.describe().map(ProbeResponse::Types),
        ProbeRequest::Inspect { factory_type, args } => {
            handler.inspect(factory_type, args).map(ProbeResponse::Context)
        }
        ProbeRequest::ApplyMigration {
            factory_type,
            migration,
        } => handler
            .apply_migration(factory_type, migration.as_deref())
            .map(|migration| ProbeResponse::Applied { migration }),
        ProbeRequest::DropDatabase { factory_type } => handler
            .drop_database(factory_type)
            .map(|existed| ProbeResponse::Dropped { existed }),
        ProbeRequest::Shutdown => Ok(ProbeResponse::Ack),
    };

    result.unwrap_or_else(|e| ProbeResponse::Error {
        message: e.to_string(),
    })
}

/// Serve requests from `reader` until `shutdown` or end of input.
pub fn serve<R, W>(handler: &mut dyn ProbeHandler, reader: R, mut writer: W) -> ScanResult<()>
where
    R: BufRead,
    W: Write,
{
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let (response, stop) = match serde_json::from_str::<ProbeRequest>(&line) {
            Ok(request) => (
                dispatch(handler, &request),
                matches!(request, ProbeRequest::Shutdown),
            ),
            Err(e) => (
                ProbeResponse::Error {
                    message: format!("invalid request: {e}"),
                },
                false,
            ),
        };

        serde_json::to_writer(&mut writer, &response)?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        if stop {
            break;
        }
    }

    Ok(())
}

/// Channel to a handler running in the host process.
///
/// Responses still pass through their JSON form so handlers see the same contract as a
/// child process would.
pub struct InProcessChannel {
    handler: Box<dyn ProbeHandler>,
    closed: bool,
}

impl InProcessChannel {
    /// Wrap a handler.
    pub fn new(handler: Box<dyn ProbeHandler>) -> Self {
        Self {
            handler,
            closed: false,
        }
    }

    /// Whether the channel has been shut down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ProbeChannel for InProcessChannel {
    fn call(&mut self, request: &ProbeRequest) -> ScanResult<ProbeResponse> {
        if self.closed {
            return Err(ScanError::probe("probe has exited"));
        }
        let response = dispatch(self.handler.as_mut(), request);
        let line = serde_json::to_string(&response)?;
        Ok(serde_json::from_str(&line)?)
    }

    fn shutdown(&mut self) -> ScanResult<()> {
        self.closed = true;
        Ok(())
    }
}

type HandlerFactory = dyn Fn(&Path) -> ScanResult<Box<dyn ProbeHandler>> + Send + Sync;

/// Launches [`InProcessChannel`]s from a handler factory.
#[derive(Clone)]
pub struct InProcessLauncher {
    factory: Arc<HandlerFactory>,
    launches: Arc<AtomicUsize>,
}

impl InProcessLauncher {
    /// Create a launcher; `factory` receives the staging directory.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&Path) -> ScanResult<Box<dyn ProbeHandler>> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            launches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of probes launched so far.
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for InProcessLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessLauncher")
            .field("launches", &self.launch_count())
            .finish()
    }
}

impl ProbeLauncher for InProcessLauncher {
    fn launch(&self, staging_dir: &Path) -> ScanResult<Box<dyn ProbeChannel>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let handler = (self.factory)(staging_dir)?;
        Ok(Box::new(InProcessChannel::new(handler)))
    }
}
