//! `sqlmig reset-migrations` command - Drop the database and remove every migration.

use crate::cli::ContextArgs;
use crate::commands::{CommandContext, confirmed, drop_database, select_contexts, warn_no_contexts};
use crate::error::CliResult;
use crate::output;

/// Run the reset-migrations command
pub async fn run(ctx: &CommandContext, args: ContextArgs) -> CliResult<()> {
    let mut scanner = ctx.scanner();
    let solution = ctx.scan_required(&mut scanner, &args.path)?;
    let targets = select_contexts(&solution, args.context.as_deref())?;

    if targets.is_empty() {
        warn_no_contexts(&solution);
        return Ok(());
    }

    let tool = ctx.tool();
    for (project, descriptor) in targets {
        let context = descriptor.short_name();
        let count = descriptor.migrations.len();

        let prompt = format!(
            "Drop the database of {} and remove its {} migration(s)?",
            context, count
        );
        if !confirmed(args.yes, &prompt) {
            output::info(&format!("Skipped {}", context));
            continue;
        }

        drop_database(&scanner, descriptor)?;

        for migration in descriptor.migrations.iter().rev() {
            let result = tool.remove_migration(project.directory(), context).await?;
            ctx.show_tool_output(&result.stdout);
            output::list_item(&format!("Removed {}", migration.name));
        }

        output::success(&format!("Removed {} migration(s) from {}", count, context));
    }

    scanner.unload();
    Ok(())
}
