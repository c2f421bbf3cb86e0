//! `converge verify`

use anyhow::Result;
use colored::Colorize;
use itemgraph::{ApplyContext, VerifyOutcome, VerifyResult, verify};
use std::process::ExitCode;

use crate::Context;
use crate::cli::VerifyArgs;
use crate::runner::LocalRunner;
use crate::ui;

pub fn run(ctx: &Context, args: VerifyArgs) -> Result<ExitCode> {
    let (graph, loaded) = super::prepare(args.node.node_file.as_deref())?;
    let apply_ctx = ApplyContext::new(&LocalRunner, &graph.node_name);
    let results = verify(&graph, &apply_ctx, loaded.workers(args.workers))?;

    if !ctx.quiet {
        ui::header(&format!("Verifying {}", graph.node_name));
    }
    for result in &results {
        if ctx.quiet && result.is_correct() {
            continue;
        }
        println!("{}", verify_line(result));
    }

    let incorrect = results.iter().filter(|r| !r.is_correct()).count();
    println!();
    if incorrect == 0 {
        ui::success(&format!("All {} items are correct", results.len()));
        Ok(ExitCode::SUCCESS)
    } else {
        ui::warn(&format!("{incorrect} of {} items need attention", results.len()));
        Ok(ExitCode::FAILURE)
    }
}

fn verify_line(result: &VerifyResult) -> String {
    let (symbol, detail) = match &result.outcome {
        VerifyOutcome::Correct => ("✓".green(), String::new()),
        VerifyOutcome::Incorrect { keys } => {
            ("✗".red(), format!("incorrect: {}", keys.join(", ")))
        }
        VerifyOutcome::Unavailable { faults } => {
            ("⊘".yellow(), format!("unavailable: {}", faults.join(", ")))
        }
        VerifyOutcome::Error { error } => ("✗".red(), error.clone()),
    };
    format!("  {symbol} {:<40} {}", result.item_id, detail.dimmed())
        .trim_end()
        .to_string()
}
