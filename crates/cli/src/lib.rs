pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "agrivision",
    about = "AgriVision operator CLI",
    long_about = "Inspect configuration, check readiness and query the fertilizer reference table.",
    after_help = "Examples:\n  agrivision doctor --json\n  agrivision config\n  \
                  agrivision fertilizer --crop rice -n 60 -p 40 -k 40"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, reference data, and provider readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Compute fertilizer advice for a crop from current N, P and K readings")]
    Fertilizer {
        #[arg(long, help = "Crop name exactly as it appears in the reference table")]
        crop: String,
        #[arg(short = 'n', long = "nitrogen", help = "Current nitrogen reading")]
        nitrogen: f64,
        #[arg(short = 'p', long = "phosphorus", help = "Current phosphorus reading")]
        phosphorus: f64,
        #[arg(short = 'k', long = "potassium", help = "Current potassium reading")]
        potassium: f64,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Fertilizer { crop, nitrogen, phosphorus, potassium } => {
            commands::fertilizer::run(&crop, nitrogen, phosphorus, potassium)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
