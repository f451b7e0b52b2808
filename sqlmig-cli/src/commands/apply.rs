//! `sqlmig apply` command - Apply pending migrations to the database.

use crate::cli::ApplyArgs;
use crate::commands::{CommandContext, apply_migrations, confirmed, select_contexts, warn_no_contexts};
use crate::error::CliResult;
use crate::output;

/// Run the apply command
pub async fn run(ctx: &CommandContext, args: ApplyArgs) -> CliResult<()> {
    let mut scanner = ctx.scanner();
    let solution = ctx.scan_required(&mut scanner, &args.path)?;
    let targets = select_contexts(&solution, args.context.as_deref())?;

    if targets.is_empty() {
        warn_no_contexts(&solution);
        return Ok(());
    }

    for (_, descriptor) in targets {
        let prompt = match &args.migration {
            Some(migration) => format!(
                "Apply migrations of {} up to {}?",
                descriptor.short_name(),
                migration
            ),
            None => format!("Apply all pending migrations of {}?", descriptor.short_name()),
        };

        if !confirmed(args.yes, &prompt) {
            output::info(&format!("Skipped {}", descriptor.short_name()));
            continue;
        }

        apply_migrations(&scanner, descriptor, args.migration.as_deref())?;
    }

    scanner.unload();
    Ok(())
}
