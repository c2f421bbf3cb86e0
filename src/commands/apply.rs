//! `converge apply`

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use itemgraph::{
    ExecuteOptions, ItemGraph, ItemResult, NoProgress, RunError, RunReport, RunSummary, execute,
};
use serde::Serialize;
use std::process::ExitCode;
use std::time::Duration;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::progress::ApplyProgress;
use crate::runner::LocalRunner;
use crate::ui;

/// Exit code when an item failed
const EXIT_FAILED: u8 = 1;
/// Exit code when items could never be applied because of a dependency loop
const EXIT_LOOP: u8 = 2;

#[derive(Serialize)]
struct JsonReport<'a> {
    node: &'a str,
    started_at: DateTime<Utc>,
    duration_ms: u128,
    summary: RunSummary,
    results: &'a [ItemResult],
}

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<ExitCode> {
    let (graph, loaded) = super::prepare(args.node.node_file.as_deref())?;
    let (my_soft_locks, other_soft_locks) = loaded.split_soft_locks(args.lock_owner.as_deref());
    let options = ExecuteOptions {
        workers: loaded.workers(args.workers),
        skip: args.skip,
        my_soft_locks,
        other_soft_locks,
    };

    if !args.json && !ctx.quiet {
        ui::header(&format!("Applying {}", graph.node_name));
        ui::kv("items", &graph.len().to_string());
        ui::kv("workers", &options.workers.to_string());
        println!();
    }

    let started_at = Utc::now();
    let report = match apply(&graph, &options, args.json, ctx.quiet) {
        Ok(report) => report,
        Err(RunError::DependencyLoop { items }) => {
            ui::error(&format!(
                "Dependency loop: {} items could not be applied",
                items.len()
            ));
            for item in &items {
                eprintln!("    {}", item.dimmed());
            }
            return Ok(ExitCode::from(EXIT_LOOP));
        }
        Err(e) => return Err(e.into()),
    };
    let summary = report.summary();

    if args.json {
        let json = JsonReport {
            node: &graph.node_name,
            started_at,
            duration_ms: report.duration.as_millis(),
            summary: summary.clone(),
            results: &report.results,
        };
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else if !ctx.quiet {
        print_summary(&summary, report.duration);
    }

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    })
}

fn apply(
    graph: &ItemGraph,
    options: &ExecuteOptions,
    json: bool,
    quiet: bool,
) -> Result<RunReport, RunError> {
    if json {
        return execute(graph, options, &LocalRunner, &mut NoProgress);
    }
    let mut progress = ApplyProgress::new(quiet);
    let report = execute(graph, options, &LocalRunner, &mut progress);
    progress.finish();
    report
}

/// Print final summary
fn print_summary(summary: &RunSummary, duration: Duration) {
    println!();
    if summary.is_success() {
        println!(
            "  {} Node converged in {:.1}s ({} items)",
            "✓".green().bold(),
            duration.as_secs_f64(),
            summary.total()
        );
    } else {
        println!(
            "  {} Apply finished with errors ({} items)",
            "⚠".yellow().bold(),
            summary.total()
        );
    }

    if summary.fixed > 0 {
        println!("    • {} items fixed", summary.fixed);
    }
    if summary.actions > 0 {
        println!("    • {} actions run", summary.actions);
    }
    if summary.ok > 0 {
        println!("    • {} items already correct", summary.ok);
    }
    if summary.skipped > 0 {
        println!("    • {} items skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "items".red());
    }
}
