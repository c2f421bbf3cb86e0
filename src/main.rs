mod cli;
mod commands;
mod config;
mod items;
mod paths;
mod progress;
mod runner;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Verify(args) => commands::verify::run(&ctx, args),
        Command::Items(args) => commands::items::run(&ctx, args).map(|()| ExitCode::SUCCESS),
        Command::Plot(args) => commands::plot::run(args).map(|()| ExitCode::SUCCESS),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "converge", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}
