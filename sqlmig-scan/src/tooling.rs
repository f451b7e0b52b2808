//! External build and migration tool invocations.

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ScanError, ScanResult};

/// Default tool program.
pub const DEFAULT_TOOL: &str = "dotnet";

/// Captured output of a successful tool run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Rendered command line.
    pub command: String,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Runs the build tool and the migration tool as child processes.
#[derive(Debug, Clone)]
pub struct MigrationTool {
    program: String,
}

impl Default for MigrationTool {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL)
    }
}

impl MigrationTool {
    /// Create a tool runner for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Tool program.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for a build.
    pub fn build_args() -> Vec<String> {
        vec!["build".to_string()]
    }

    /// Arguments for adding a migration.
    pub fn add_migration_args(name: &str, context: &str, output_dir: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = ["ef", "migrations", "add", name, "--context", context]
            .into_iter()
            .map(str::to_string)
            .collect();

        if let Some(dir) = output_dir {
            args.push("--output-dir".to_string());
            args.push(dir.to_string());
        }

        args.push("--verbose".to_string());
        args
    }

    /// Arguments for removing the last migration.
    pub fn remove_migration_args(context: &str) -> Vec<String> {
        ["ef", "migrations", "remove", "--context", context, "--verbose"]
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Build in `dir`.
    pub async fn build(&self, dir: &Path) -> ScanResult<ToolOutput> {
        self.run(dir, &Self::build_args()).await
    }

    /// Add a migration to the project in `project_dir`.
    pub async fn add_migration(
        &self,
        project_dir: &Path,
        name: &str,
        context: &str,
        output_dir: Option<&str>,
    ) -> ScanResult<ToolOutput> {
        self.run(project_dir, &Self::add_migration_args(name, context, output_dir))
            .await
    }

    /// Remove the last migration of `context` in `project_dir`.
    pub async fn remove_migration(&self, project_dir: &Path, context: &str) -> ScanResult<ToolOutput> {
        self.run(project_dir, &Self::remove_migration_args(context))
            .await
    }

    /// Render a command line for display.
    pub fn render(&self, args: &[String]) -> String {
        std::iter::once(self.program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the tool in `dir` and wait for it to exit.
    pub async fn run(&self, dir: &Path, args: &[String]) -> ScanResult<ToolOutput> {
        let command = self.render(args);
        info!("Running `{}` in {}", command, dir.display());

        let output = Command::new(&self.program)
            .args(args)
            .current_dir(dir)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            debug!("`{}` exited with {}", command, output.status);
            return Err(ScanError::ToolFailed {
                command,
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(ToolOutput {
            command,
            stdout,
            stderr,
        })
    }
}
