//! CLI command implementations.

pub mod add;
pub mod apply;
pub mod build;
pub mod drop;
pub mod pending;
pub mod remove;
pub mod reset;
pub mod reset_migrations;
pub mod scan;
pub mod version;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlmig_scan::{
    MigrationTool, Project, ProjectLocator, SchemaContextDescriptor, SchemaContextSession, Solution,
    SolutionScanner,
};

use crate::config::Config;
use crate::error::{CliError, CliResult};
use crate::output;

/// Exit status after Ctrl-C outside a scan (128 + SIGINT)
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Shared state for a command invocation
pub struct CommandContext {
    /// Loaded configuration
    pub config: Config,
    /// `-v` count
    pub verbose: u8,
    /// Set while a scan is running
    scanning: Arc<AtomicBool>,
}

impl CommandContext {
    /// Create a command context
    pub fn new(config: Config, verbose: u8) -> Self {
        Self {
            config,
            verbose,
            scanning: Arc::new(AtomicBool::new(false)),
        }
    }

    /// External tool runner
    pub fn tool(&self) -> MigrationTool {
        MigrationTool::new(self.config.tool.program.clone())
    }

    /// Scanner whose scans stop at the next project on Ctrl-C.
    ///
    /// Ctrl-C outside a scan (at a prompt, while a tool runs) exits the process.
    pub fn scanner(&self) -> SolutionScanner {
        let scanner = SolutionScanner::new(self.config.scanner.clone());
        let cancelled = scanner.cancellation();
        let scanning = Arc::clone(&self.scanning);

        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if let Some(code) = on_interrupt(&scanning, &cancelled) {
                    output::newline();
                    std::process::exit(code);
                }
            }
        });

        scanner
    }

    /// Scan from `path`, routing Ctrl-C to the scan while it runs
    pub fn scan<'a>(
        &self,
        scanner: &'a mut SolutionScanner,
        path: &Path,
    ) -> CliResult<Option<&'a Solution>> {
        let start = absolute(path);

        self.scanning.store(true, Ordering::SeqCst);
        let result = scanner.try_scan(Some(&start));
        self.scanning.store(false, Ordering::SeqCst);

        Ok(result?)
    }

    /// Locate the solution manifest without scanning
    pub fn find_solution_manifest(&self, path: &Path) -> Option<PathBuf> {
        ProjectLocator::new(&self.config.scanner).find_solution_manifest(&absolute(path))
    }

    /// Scan from `path`; a missing solution is an error
    pub fn scan_required(&self, scanner: &mut SolutionScanner, path: &Path) -> CliResult<Solution> {
        let start = absolute(path);
        self.scan(scanner, &start)?
            .cloned()
            .ok_or(CliError::NoSolution(start))
    }

    /// Print captured tool output when running verbosely
    pub fn show_tool_output(&self, stdout: &str) {
        if self.verbose > 0 {
            output::dim(stdout);
        }
    }
}

/// Route one Ctrl-C: cancel a running scan, otherwise return the exit status to leave with
pub fn on_interrupt(scanning: &AtomicBool, cancelled: &AtomicBool) -> Option<i32> {
    if scanning.load(Ordering::SeqCst) {
        cancelled.store(true, Ordering::SeqCst);
        None
    } else {
        Some(INTERRUPTED_EXIT_CODE)
    }
}

/// Resolve `path` against the current directory
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Contexts named by `--context`, or all of them
pub fn select_contexts<'a>(
    solution: &'a Solution,
    context: Option<&str>,
) -> CliResult<Vec<(&'a Project, &'a SchemaContextDescriptor)>> {
    match context {
        Some(name) => solution
            .find_context(name)
            .map(|found| vec![found])
            .ok_or_else(|| CliError::Validation(format!("Unknown context '{}'", name))),
        None => Ok(solution.contexts().collect()),
    }
}

/// Open a live session on a scanned context
pub fn open_session(
    scanner: &SolutionScanner,
    descriptor: &SchemaContextDescriptor,
) -> CliResult<SchemaContextSession> {
    scanner.open_session(descriptor).ok_or_else(|| {
        CliError::Scan(format!(
            "Could not load {} from {}",
            descriptor.short_name(),
            descriptor.artifact_path.display()
        ))
    })
}

/// Ask unless `--yes` was given
pub fn confirmed(yes: bool, prompt: &str) -> bool {
    yes || output::confirm(prompt)
}

/// Warn that there is nothing to operate on
pub fn warn_no_contexts(solution: &Solution) {
    output::warn(&format!(
        "No schema contexts found in {}",
        solution.name()
    ));
}

/// Drop the database behind `descriptor`
pub fn drop_database(scanner: &SolutionScanner, descriptor: &SchemaContextDescriptor) -> CliResult<()> {
    let session = open_session(scanner, descriptor)?;
    let database = session
        .database_name()?
        .unwrap_or_else(|| "(unnamed)".to_string());

    if session.drop_database()? {
        output::success(&format!(
            "Dropped database {} for {}",
            database,
            descriptor.short_name()
        ));
    } else {
        output::info(&format!(
            "Database {} for {} did not exist",
            database,
            descriptor.short_name()
        ));
    }
    Ok(())
}

/// Apply pending migrations of `descriptor`, up to `target` when given
pub fn apply_migrations(
    scanner: &SolutionScanner,
    descriptor: &SchemaContextDescriptor,
    target: Option<&str>,
) -> CliResult<()> {
    let session = open_session(scanner, descriptor)?;
    let name = descriptor.short_name();

    let target = match target {
        Some(wanted) => Some(session.find_pending(wanted)?.ok_or_else(|| {
            CliError::Validation(format!("Migration '{}' is not pending for {}", wanted, name))
        })?),
        None => None,
    };

    if target.is_none() && session.pending_migrations()?.is_empty() {
        output::info(&format!("{} is up to date", name));
        return Ok(());
    }

    match session.apply_migration(target.as_deref())? {
        Some(last) => output::success(&format!("Applied {} to {}", last, name)),
        None => output::info(&format!("{} is up to date", name)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_during_scan_cancels() {
        let scanning = AtomicBool::new(true);
        let cancelled = AtomicBool::new(false);

        assert_eq!(on_interrupt(&scanning, &cancelled), None);
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_interrupt_outside_scan_exits() {
        let scanning = AtomicBool::new(false);
        let cancelled = AtomicBool::new(false);

        assert_eq!(on_interrupt(&scanning, &cancelled), Some(INTERRUPTED_EXIT_CODE));
        assert!(!cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_absolute_keeps_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(absolute(dir.path()), dir.path());
        assert!(absolute(Path::new("src/Data")).is_absolute());
    }
}
