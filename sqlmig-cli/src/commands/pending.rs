//! `sqlmig pending` command - Show model changes not yet captured by a migration.

use crate::cli::PendingArgs;
use crate::commands::{CommandContext, absolute};
use crate::error::CliResult;
use crate::output;
use crate::tree::{TreeView, render_tree};

/// Run the pending command
pub async fn run(ctx: &CommandContext, args: PendingArgs) -> CliResult<()> {
    let start = absolute(&args.path);

    let Some(manifest) = ctx.find_solution_manifest(&start) else {
        output::warn(&format!("No solution manifest found from {}", start.display()));
        return Ok(());
    };

    if !args.no_build {
        let dir = manifest.parent().unwrap_or(&start);
        output::info(&format!("Building {}...", dir.display()));
        let built = ctx.tool().build(dir).await?;
        ctx.show_tool_output(&built.stdout);
    }

    let mut scanner = ctx.scanner();
    let solution = ctx.scan_required(&mut scanner, &start)?;

    output::header("Pending Model Changes");
    print!(
        "{}",
        render_tree(&solution, TreeView::PendingChanges, output::use_color())
    );

    let destructive = solution
        .contexts()
        .filter(|(_, d)| d.has_destructive_changes())
        .count();
    if destructive > 0 {
        output::newline();
        output::warn(&format!(
            "{} context(s) have changes that may lose data",
            destructive
        ));
    }

    scanner.unload();
    Ok(())
}
