//! `sqlmig remove` command - Remove the last migration of schema contexts.

use crate::cli::ContextArgs;
use crate::commands::{CommandContext, confirmed, select_contexts, warn_no_contexts};
use crate::error::CliResult;
use crate::output;

/// Run the remove command
pub async fn run(ctx: &CommandContext, args: ContextArgs) -> CliResult<()> {
    let mut scanner = ctx.scanner();
    let solution = ctx.scan_required(&mut scanner, &args.path)?;
    let targets = select_contexts(&solution, args.context.as_deref())?;
    scanner.unload();

    if targets.is_empty() {
        warn_no_contexts(&solution);
        return Ok(());
    }

    let tool = ctx.tool();
    for (project, descriptor) in targets {
        let context = descriptor.short_name();

        let Some(last) = descriptor.migrations.last() else {
            output::info(&format!("{} has no migrations", context));
            continue;
        };

        if !confirmed(
            args.yes,
            &format!("Remove migration {} from {}?", last.name, context),
        ) {
            output::info(&format!("Skipped {}", context));
            continue;
        }

        let result = tool.remove_migration(project.directory(), context).await?;
        ctx.show_tool_output(&result.stdout);
        output::success(&format!("Removed migration {} from {}", last.name, context));
    }

    Ok(())
}
