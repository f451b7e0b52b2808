//! CLI error types and result alias.

use std::path::PathBuf;

use miette::Diagnostic;
use sqlmig_scan::ScanError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// IO error
    #[error("IO error: {0}")]
    #[diagnostic(code(sqlmig::io))]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    #[diagnostic(code(sqlmig::config))]
    Config(String),

    /// No solution manifest found
    #[error("No solution found from {}", .0.display())]
    #[diagnostic(code(sqlmig::no_solution), help("run from inside the solution directory or pass its path"))]
    NoSolution(PathBuf),

    /// Invalid command input
    #[error("Validation error: {0}")]
    #[diagnostic(code(sqlmig::validation))]
    Validation(String),

    /// External tool failure
    #[error("`{command}` failed with exit code {}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    #[diagnostic(code(sqlmig::tool))]
    Tool {
        /// Rendered command line
        command: String,
        /// Exit code
        code: Option<i32>,
        /// Captured output
        output: String,
    },

    /// Scanner or probe error
    #[error("Scan error: {0}")]
    #[diagnostic(code(sqlmig::scan))]
    Scan(String),

    /// Interrupted by the user
    #[error("Cancelled")]
    #[diagnostic(code(sqlmig::cancelled))]
    Cancelled,
}

impl CliError {
    /// Additional output worth showing below the error line.
    pub fn details(&self) -> Option<&str> {
        match self {
            Self::Tool { output, .. } if !output.trim().is_empty() => Some(output),
            _ => None,
        }
    }
}

impl From<ScanError> for CliError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::ToolFailed {
                command,
                code,
                stdout,
                stderr,
            } => {
                let output = [stdout.trim(), stderr.trim()]
                    .into_iter()
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                CliError::Tool {
                    command,
                    code,
                    output,
                }
            }
            ScanError::Cancelled => CliError::Cancelled,
            ScanError::NotFound(what) => CliError::Validation(format!("'{}' not found", what)),
            other => CliError::Scan(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::Config(format!("Failed to parse TOML: {}", err))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Scan(format!("Failed to encode JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failure_keeps_output() {
        let err: CliError = ScanError::ToolFailed {
            command: "dotnet build".to_string(),
            code: Some(1),
            stdout: "Build FAILED.\n".to_string(),
            stderr: String::new(),
        }
        .into();

        assert_eq!(err.to_string(), "`dotnet build` failed with exit code 1");
        assert_eq!(err.details(), Some("Build FAILED."));
    }

    #[test]
    fn test_scan_error_conversion() {
        let err: CliError = ScanError::probe("boom").into();
        assert!(matches!(err, CliError::Scan(_)));
        assert!(err.details().is_none());

        let err: CliError = ScanError::Cancelled.into();
        assert!(matches!(err, CliError::Cancelled));
    }

    #[test]
    fn test_toml_error_conversion() {
        let err: CliError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
