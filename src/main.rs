//! DriveScan: record the folder-size layout of a drive as named scans.
//!
//! Thin binary entry point. All logic lives in the `drivescan-core` crate;
//! this crate parses arguments, renders results, and shows progress.

mod cli;
mod commands;

use clap::Parser;
use drivescan_core::config::Settings;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Logs go to stderr so command output stays pipeable.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let settings = Settings::resolve(cli.history.clone());
    tracing::debug!("History folder: {}", settings.history_dir.display());

    commands::run(cli.command, &settings)
}
