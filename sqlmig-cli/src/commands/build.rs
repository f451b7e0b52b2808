//! `sqlmig build` command - Build the solution.

use crate::cli::PathArgs;
use crate::commands::{CommandContext, absolute};
use crate::error::{CliError, CliResult};
use crate::output;

/// Run the build command
pub async fn run(ctx: &CommandContext, args: PathArgs) -> CliResult<()> {
    let start = absolute(&args.path);
    let manifest = ctx
        .find_solution_manifest(&start)
        .ok_or(CliError::NoSolution(start))?;
    let dir = manifest.parent().unwrap_or(&manifest);

    output::info(&format!("Building {}...", manifest.display()));
    let built = ctx.tool().build(dir).await?;
    ctx.show_tool_output(&built.stdout);

    output::success("Build succeeded");
    Ok(())
}
