//! CLI argument definitions using clap.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// sqlmig - Schema migrations across a whole solution
#[derive(Parser, Debug)]
#[command(name = "sqlmig")]
#[command(version)]
#[command(about = "sqlmig - Schema migrations across a whole solution", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file (defaults to ./sqlmig.toml when present)
    #[arg(long, global = true, env = "SQLMIG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan the solution and show migrations per schema context
    Scan(ScanArgs),

    /// Build, scan and show model changes not yet captured by a migration
    Pending(PendingArgs),

    /// Build the solution
    Build(PathArgs),

    /// Add a migration to one or more schema contexts
    Add(AddArgs),

    /// Remove the last migration of one or more schema contexts
    Remove(ContextArgs),

    /// Apply pending migrations to the database
    Apply(ApplyArgs),

    /// Drop the database of one or more schema contexts
    Drop(ContextArgs),

    /// Drop the database and re-apply all migrations
    Reset(ContextArgs),

    /// Drop the database and remove every migration of a schema context
    ResetMigrations(ContextArgs),

    /// Display version information
    Version,
}

/// Arguments taking only a search path
#[derive(Args, Debug)]
pub struct PathArgs {
    /// Directory to search for the solution from (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

/// Arguments for the `scan` command
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory to search for the solution from (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Print the solution graph as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `pending` command
#[derive(Args, Debug)]
pub struct PendingArgs {
    /// Directory to search for the solution from (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Skip building the solution first
    #[arg(long)]
    pub no_build: bool,
}

/// Arguments selecting schema contexts
#[derive(Args, Debug)]
pub struct ContextArgs {
    /// Directory to search for the solution from (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Schema context short name (all contexts when omitted)
    #[arg(short, long)]
    pub context: Option<String>,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the `add` command
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Directory to search for the solution from (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Schema context short name; requires --name
    #[arg(short, long)]
    pub context: Option<String>,

    /// Migration name
    #[arg(short = 'm', long = "name", alias = "migration-name")]
    pub name: Option<String>,

    /// Output directory for the migration files, relative to the project
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the `apply` command
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Directory to search for the solution from (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Schema context short name (all contexts when omitted)
    #[arg(short, long)]
    pub context: Option<String>,

    /// Apply up to this migration (full identifier or name suffix)
    #[arg(long, alias = "migration-name")]
    pub migration: Option<String>,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_command_line_mode() {
        let cli = Cli::parse_from([
            "sqlmig",
            "add",
            "--context",
            "TestDbContext",
            "-m",
            "AddUsername",
        ]);
        match cli.command {
            Command::Add(args) => {
                assert_eq!(args.context.as_deref(), Some("TestDbContext"));
                assert_eq!(args.name.as_deref(), Some("AddUsername"));
                assert_eq!(args.path, PathBuf::from("."));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::parse_from(["sqlmig", "scan", "src", "-vv", "--config", "x.toml"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        match cli.command {
            Command::Scan(args) => assert_eq!(args.path, PathBuf::from("src")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_apply_migration_alias() {
        let cli = Cli::parse_from(["sqlmig", "apply", "--migration-name", "AddFirstName", "-y"]);
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.migration.as_deref(), Some("AddFirstName"));
                assert!(args.yes);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
