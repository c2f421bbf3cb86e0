//! Terminal progress for apply runs

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use itemgraph::{ApplyOutcome, ItemResult, ProgressCallback};

/// Progress bar plus one line per finished item
pub struct ApplyProgress {
    bar: ProgressBar,
    quiet: bool,
}

impl ApplyProgress {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar, quiet }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_run_start(&mut self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_item_start(&mut self, id: &str) {
        self.bar.set_message(id.to_string());
    }

    fn on_item_complete(&mut self, result: &ItemResult) {
        self.bar.inc(1);
        if self.quiet && !result.outcome.is_failure() {
            return;
        }
        let line = result_line(result);
        self.bar.suspend(|| println!("{line}"));
    }
}

/// Symbol for an outcome: ○ unchanged, ✓ changed, ✗ failed, ⊘ skipped
pub fn symbol(outcome: &ApplyOutcome) -> colored::ColoredString {
    match outcome {
        ApplyOutcome::Ok => "○".dimmed(),
        ApplyOutcome::Fixed | ApplyOutcome::ActionSucceeded => "✓".green(),
        ApplyOutcome::Failed { .. } => "✗".red(),
        ApplyOutcome::Skipped { .. } => "⊘".yellow(),
    }
}

fn result_line(result: &ItemResult) -> String {
    let detail = match &result.outcome {
        ApplyOutcome::Ok => String::new(),
        ApplyOutcome::Failed { error } => error.red().to_string(),
        other => other.to_string().dimmed().to_string(),
    };
    format!(
        "  {} {:<40} {}",
        symbol(&result.outcome),
        result.item_id,
        detail
    )
    .trim_end()
    .to_string()
}
