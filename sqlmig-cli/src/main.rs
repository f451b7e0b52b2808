//! sqlmig CLI - Command-line interface for solution-wide schema migrations.

use clap::Parser;

use sqlmig_cli::cli::{Cli, Command};
use sqlmig_cli::commands::{self, CommandContext};
use sqlmig_cli::config::Config;
use sqlmig_cli::error::CliResult;
use sqlmig_cli::{logging, output};

#[tokio::main]
async fn main() {
    // Run the CLI and handle errors
    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        if let Some(details) = e.details() {
            output::dim(details);
        }
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Command::Version = cli.command {
        return commands::version::run().await;
    }

    let config = Config::discover(cli.config.as_deref())?;
    let ctx = CommandContext::new(config, cli.verbose);

    match cli.command {
        Command::Scan(args) => commands::scan::run(&ctx, args).await,
        Command::Pending(args) => commands::pending::run(&ctx, args).await,
        Command::Build(args) => commands::build::run(&ctx, args).await,
        Command::Add(args) => commands::add::run(&ctx, args).await,
        Command::Remove(args) => commands::remove::run(&ctx, args).await,
        Command::Apply(args) => commands::apply::run(&ctx, args).await,
        Command::Drop(args) => commands::drop::run(&ctx, args).await,
        Command::Reset(args) => commands::reset::run(&ctx, args).await,
        Command::ResetMigrations(args) => commands::reset_migrations::run(&ctx, args).await,
        Command::Version => commands::version::run().await,
    }
}
