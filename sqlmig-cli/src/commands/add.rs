//! `sqlmig add` command - Add a migration to one or more schema contexts.

use crate::cli::AddArgs;
use crate::commands::{CommandContext, confirmed, select_contexts, warn_no_contexts};
use crate::error::{CliError, CliResult};
use crate::output;

/// Run the add command
pub async fn run(ctx: &CommandContext, args: AddArgs) -> CliResult<()> {
    if args.context.is_some() && args.name.is_none() {
        return Err(CliError::Validation(
            "--name is required when --context is given".to_string(),
        ));
    }

    let mut scanner = ctx.scanner();
    let solution = ctx.scan_required(&mut scanner, &args.path)?;
    let targets = select_contexts(&solution, args.context.as_deref())?;
    scanner.unload();

    if targets.is_empty() {
        warn_no_contexts(&solution);
        return Ok(());
    }

    let tool = ctx.tool();
    let mut added = 0usize;

    for (project, descriptor) in targets {
        let context = descriptor.short_name();

        if !confirmed(
            args.yes || args.context.is_some(),
            &format!("Add a migration to {}?", context),
        ) {
            output::info(&format!("Skipped {}", context));
            continue;
        }

        let Some(name) = args
            .name
            .clone()
            .or_else(|| output::input(&format!("Migration name for {}", context)))
        else {
            output::warn(&format!("No migration name given, skipped {}", context));
            continue;
        };

        let result = tool
            .add_migration(project.directory(), &name, context, args.output_dir.as_deref())
            .await?;
        ctx.show_tool_output(&result.stdout);

        output::success(&format!("Added migration {} to {}", name, context));
        added += 1;
    }

    if added == 0 {
        output::info("No migrations added");
    }
    Ok(())
}
