//! `sqlmig reset` command - Drop the database and re-apply all migrations.

use crate::cli::ContextArgs;
use crate::commands::{
    CommandContext, apply_migrations, confirmed, drop_database, select_contexts, warn_no_contexts,
};
use crate::error::CliResult;
use crate::output;

/// Run the reset command
pub async fn run(ctx: &CommandContext, args: ContextArgs) -> CliResult<()> {
    let mut scanner = ctx.scanner();
    let solution = ctx.scan_required(&mut scanner, &args.path)?;
    let targets = select_contexts(&solution, args.context.as_deref())?;

    if targets.is_empty() {
        warn_no_contexts(&solution);
        return Ok(());
    }

    for (_, descriptor) in targets {
        let prompt = format!(
            "Drop and recreate the database of {}? All data will be lost.",
            descriptor.short_name()
        );
        if !confirmed(args.yes, &prompt) {
            output::info(&format!("Skipped {}", descriptor.short_name()));
            continue;
        }

        drop_database(&scanner, descriptor)?;
        apply_migrations(&scanner, descriptor, None)?;
    }

    scanner.unload();
    Ok(())
}
