use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::commands::CommandReport;
use crate::logging;

#[derive(Parser)]
#[command(
    name = "snapsync",
    version,
    about = "Branch snapshot automation: archive every tracked branch, index the results, prune stale archives"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, archive every tracked branch, update the index, prune
    Update,
    /// Show resolved paths and the current index contents
    Status,
    /// Re-check every indexed archive against its recorded hashes and size
    Verify {
        /// Also flag archive files the index does not reference
        #[arg(long)]
        strict: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    let report = match cli.command {
        Commands::Update => commands::update::run()?,
        Commands::Status => commands::status::run()?,
        Commands::Verify { strict } => {
            commands::verify::run(&commands::verify::VerifyOptions { strict })?
        }
    };

    render(&report);
    if !report.ok {
        anyhow::bail!(
            "{} finished with {} issue(s)",
            report.command,
            report.issues.len()
        );
    }
    Ok(())
}

fn render(report: &CommandReport) {
    println!("== {} ==", report.command);
    for line in &report.details {
        println!("{line}");
    }
    for line in &report.issues {
        println!("issue: {line}");
    }
}
