//! Schema bootstrap entry point.
//!
//! # Responsibility
//! - Load configuration, start logging and run the catalog bootstrap.
//! - Map the bootstrap outcome to a process exit code.

use clap::Parser;
use schemasync_core::log_sink::describe_cause;
use schemasync_core::{
    catalog, default_log_level, init_console_logging, init_logging, AppConfig, Bootstrapper,
    Outcome, StructuredLogSink,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "schemasync")]
#[command(about = "Verify and repair the application schema", long_about = None)]
struct Cli {
    /// JSON config file with a `Database` section
    #[arg(long)]
    config: Option<PathBuf>,
    /// SQLite database file (overrides config; in-memory when absent)
    #[arg(long)]
    storage: Option<PathBuf>,
    /// Drop every declared table before verifying
    #[arg(long)]
    drop_all_tables: bool,
    /// Recreate tables during the first pass
    #[arg(long)]
    force_recreate: bool,
    /// Allow structural alterations during the first pass
    #[arg(long)]
    allow_alter: bool,
    /// Forward every driver statement to the log
    #[arg(long)]
    verbose: bool,
    /// trace|debug|info|warn|error
    #[arg(long)]
    log_level: Option<String>,
    /// Absolute directory for rolling log files (stderr when absent)
    #[arg(long)]
    log_dir: Option<String>,
    /// Print the bootstrap report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("Error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, String> {
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    match cli.log_dir.as_deref() {
        Some(dir) => init_logging(level, dir)?,
        None => init_console_logging(level)?,
    }

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path).map_err(|err| describe_cause(&err))?,
        None => AppConfig::default(),
    };
    let database = &mut config.database;
    if cli.storage.is_some() {
        database.storage = cli.storage;
    }
    database.drop_all_tables |= cli.drop_all_tables;
    database.force_recreate |= cli.force_recreate;
    database.allow_alter |= cli.allow_alter;
    database.verbose |= cli.verbose;

    let graph = catalog::relationship_graph().map_err(|err| err.to_string())?;
    let mut bootstrapper = Bootstrapper::new(
        database.connector(),
        catalog::entities(),
        graph,
        database.bootstrap_options(),
        Box::new(StructuredLogSink::new()),
    );
    let report = bootstrapper.run();

    if cli.json {
        let rendered = serde_json::to_string_pretty(&report).map_err(|err| err.to_string())?;
        println!("{rendered}");
    } else {
        println!("outcome={} attempts={}", report.outcome, report.attempts);
        let unresolved = report.unresolved();
        if !unresolved.is_empty() {
            println!("unresolved={}", unresolved.join(","));
        }
    }

    if report.outcome == Outcome::Failed {
        log::error!("event=cli_exit module=cli status=error outcome=failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
