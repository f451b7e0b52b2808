//! Error types for the solution scanner.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for scanner operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that can occur while scanning, probing or invoking external tools.
#[derive(Debug, Error)]
pub enum ScanError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Dependency manifest missing or malformed.
    #[error("Dependency manifest error for '{path}': {message}")]
    DependencyManifest {
        /// Manifest path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The probe reported an error or answered out of protocol.
    #[error("Probe error: {0}")]
    Probe(String),

    /// The probe did not answer in time.
    #[error("Probe did not respond within {0} seconds")]
    ProbeTimeout(u64),

    /// The isolated context was already unloaded.
    #[error("Isolated context for '{0}' has been unloaded")]
    ContextUnloaded(PathBuf),

    /// A named item (context, migration) was not found.
    #[error("'{0}' not found")]
    NotFound(String),

    /// An external tool exited unsuccessfully.
    #[error("`{command}` failed with exit code {code:?}")]
    ToolFailed {
        /// Rendered command line.
        command: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The scan was cancelled before completion.
    #[error("Scan cancelled")]
    Cancelled,
}

impl ScanError {
    /// Create a probe error.
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create a dependency manifest error.
    pub fn dependency_manifest(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::DependencyManifest {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Captured output of a failed tool run, if any.
    pub fn tool_output(&self) -> Option<(&str, &str)> {
        match self {
            Self::ToolFailed { stdout, stderr, .. } => Some((stdout, stderr)),
            _ => None,
        }
    }
}
