pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "pesto",
    about = "Pesto operator CLI",
    long_about = "Inspect configuration, check readiness, apply migrations and import member interests for the Pesto Slack bot.",
    after_help = "Examples:\n  pesto doctor --json\n  pesto config\n  pesto import-interests members.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Slack token readiness, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Load member interest profiles from a JSON file into the topic graph")]
    ImportInterests {
        #[arg(help = "Path to a JSON array of {user_id, display_name, interests} objects")]
        file: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::ImportInterests { file } => commands::import::run(&file),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
