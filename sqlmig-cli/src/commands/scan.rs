//! `sqlmig scan` command - Show migrations per schema context.

use crate::cli::ScanArgs;
use crate::commands::{CommandContext, absolute};
use crate::error::CliResult;
use crate::output;
use crate::tree::{TreeView, render_tree};

/// Run the scan command
pub async fn run(ctx: &CommandContext, args: ScanArgs) -> CliResult<()> {
    let start = absolute(&args.path);
    let mut scanner = ctx.scanner();

    let Some(solution) = ctx.scan(&mut scanner, &start)? else {
        output::warn(&format!("No solution manifest found from {}", start.display()));
        return Ok(());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(solution)?);
    } else {
        output::header("Migrations");
        print!("{}", render_tree(solution, TreeView::Migrations, output::use_color()));

        if !solution.has_migrations() {
            output::newline();
            output::info("No migrations recorded yet");
        }
    }

    scanner.unload();
    Ok(())
}
