//! Scanner configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Generic design-time factory interface, matched by prefix against implemented interfaces.
pub const DESIGN_TIME_FACTORY_INTERFACE: &str =
    "Microsoft.EntityFrameworkCore.Design.IDesignTimeDbContextFactory`1";

/// Scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Solution manifest extensions, without the leading dot.
    pub solution_extensions: Vec<String>,

    /// Project manifest extension, without the leading dot.
    pub project_extension: String,

    /// Marker substrings identifying a data-migration project (case-insensitive).
    pub project_markers: Vec<String>,

    /// Build configurations searched for a compiled artifact, in order.
    pub build_configurations: Vec<String>,

    /// Compiled artifact extension, without the leading dot.
    pub artifact_extension: String,

    /// Interface name prefix a design-time factory must implement.
    pub factory_interface: String,

    /// Isolated loader configuration.
    pub loader: LoaderConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            solution_extensions: vec!["sln".to_string(), "slnx".to_string()],
            project_extension: "csproj".to_string(),
            project_markers: vec![
                "Nabs.Launchpad.Core.SeedData".to_string(),
                "Nabs.Launchpad.Core.DataMigrations".to_string(),
            ],
            build_configurations: vec!["Debug".to_string(), "Release".to_string()],
            artifact_extension: "dll".to_string(),
            factory_interface: DESIGN_TIME_FACTORY_INTERFACE.to_string(),
            loader: LoaderConfig::default(),
        }
    }
}

impl ScannerConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the project markers.
    pub fn project_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.project_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the probe command line.
    pub fn probe_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.loader.probe_command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Force collectible (or non-collectible) isolated contexts.
    pub fn collectible(mut self, collectible: bool) -> Self {
        self.loader.collectible = Some(collectible);
        self
    }
}

/// Isolated loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Module names that always resolve to the host's copy and are never staged.
    pub shared_modules: Vec<String>,

    /// Probe helper command line; the first entry is the program.
    pub probe_command: Vec<String>,

    /// Seconds to wait for a single probe response.
    pub probe_timeout_secs: u64,

    /// Whether unloaded contexts release their staged copies.
    /// `None` detects an attached debugger and keeps copies while one is present.
    pub collectible: Option<bool>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            shared_modules: vec![
                "Microsoft.EntityFrameworkCore".to_string(),
                "Microsoft.EntityFrameworkCore.Relational".to_string(),
                "Microsoft.EntityFrameworkCore.Design".to_string(),
                "Microsoft.EntityFrameworkCore.Abstractions".to_string(),
                "Microsoft.Extensions.Logging.Abstractions".to_string(),
                "Microsoft.Extensions.DependencyInjection.Abstractions".to_string(),
            ],
            probe_command: vec!["sqlmig-probe".to_string()],
            probe_timeout_secs: 60,
            collectible: None,
        }
    }
}

impl LoaderConfig {
    /// Probe response timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Whether `module` is on the shared allowlist.
    pub fn is_shared(&self, module: &str) -> bool {
        self.shared_modules.iter().any(|m| m == module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScannerConfig::default();
        assert_eq!(config.solution_extensions, vec!["sln", "slnx"]);
        assert_eq!(config.project_extension, "csproj");
        assert_eq!(config.build_configurations, vec!["Debug", "Release"]);
        assert!(config.factory_interface.ends_with("IDesignTimeDbContextFactory`1"));
    }

    #[test]
    fn test_shared_allowlist() {
        let loader = LoaderConfig::default();
        assert!(loader.is_shared("Microsoft.EntityFrameworkCore"));
        assert!(loader.is_shared("Microsoft.Extensions.Logging.Abstractions"));
        assert!(!loader.is_shared("Microsoft.EntityFrameworkCore.SqlServer"));
        assert!(!loader.is_shared("microsoft.entityframeworkcore"));
    }

    #[test]
    fn test_builder_methods() {
        let config = ScannerConfig::new()
            .project_markers(["My.Marker"])
            .probe_command(["dotnet", "probe.dll"])
            .collectible(false);

        assert_eq!(config.project_markers, vec!["My.Marker"]);
        assert_eq!(config.loader.probe_command, vec!["dotnet", "probe.dll"]);
        assert_eq!(config.loader.collectible, Some(false));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ScannerConfig =
            serde_json::from_str(r#"{"project_extension": "fsproj"}"#).unwrap();
        assert_eq!(config.project_extension, "fsproj");
        assert_eq!(config.artifact_extension, "dll");
        assert_eq!(config.loader.probe_timeout_secs, 60);
    }
}
