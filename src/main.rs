//! # Landing Pipeline Entry Point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Load settings (file + environment)
//!   ├─> Initialize logging
//!   └─> Execute the subcommand
//! ```
//!
//! ```bash
//! landing-pipeline process --bucket raw --file-path landing-zone/sales/a.csv --table-name tbl_sales
//! landing-pipeline validate params.json
//! landing-pipeline name report_20240115.txt --pattern '.*report.*' --template out_
//! ```

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // Allow println! in main binary

mod cli;

use anyhow::Result;
use clap::Parser as _;
use landing_pipeline::config::Settings;
use landing_pipeline::logging;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let settings = Settings::load(cli.settings.as_deref())?;

    logging::init(settings.log_dir.as_deref())?;
    tracing::debug!("Settings: {settings:?}");

    cli::run_command(cli.command, settings)
}
