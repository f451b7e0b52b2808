//! CLI configuration handling.

use serde::{Deserialize, Serialize};
use std::path::Path;

use sqlmig_scan::ScannerConfig;
use sqlmig_scan::tooling::DEFAULT_TOOL;

use crate::error::{CliError, CliResult};

/// Default config file name (looked up in the current directory)
pub const CONFIG_FILE_NAME: &str = "sqlmig.toml";

/// sqlmig CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scanner configuration
    pub scanner: ScannerConfig,

    /// External tool configuration
    pub tool: ToolConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `explicit` if given, else `./sqlmig.toml` when present, else defaults
    pub fn discover(explicit: Option<&Path>) -> CliResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let local = std::env::current_dir()?.join(CONFIG_FILE_NAME);
        if local.is_file() {
            tracing::debug!("Using configuration {}", local.display());
            Self::load(&local)
        } else {
            Ok(Self::default())
        }
    }
}

/// External tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Program used for builds and migration commands
    pub program: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_TOOL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tool.program, "dotnet");
        assert_eq!(config.scanner.project_extension, "csproj");
    }

    #[test]
    fn test_load_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"
[scanner]
project_markers = ["Acme.Data.Migrations"]

[scanner.loader]
probe_command = ["dotnet", "tools/probe.dll"]
probe_timeout_secs = 120

[tool]
program = "/usr/local/bin/dotnet"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.scanner.project_markers, vec!["Acme.Data.Migrations"]);
        assert_eq!(config.scanner.loader.probe_command, vec!["dotnet", "tools/probe.dll"]);
        assert_eq!(config.scanner.loader.probe_timeout_secs, 120);
        assert_eq!(config.scanner.build_configurations, vec!["Debug", "Release"]);
        assert_eq!(config.tool.program, "/usr/local/bin/dotnet");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[scanner\n").unwrap();
        assert!(matches!(Config::load(&path), Err(CliError::Config(_))));
    }
}
