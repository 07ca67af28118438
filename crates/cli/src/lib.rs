pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "innkeep",
    about = "Innkeep operator CLI",
    long_about = "Prepare the listing database, inspect configuration, check readiness, and replay \
                  a scripted booking conversation.",
    after_help = "Examples:\n  innkeep migrate\n  innkeep seed\n  innkeep doctor --json\n  innkeep simulate"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Store the demo listing and verify it can be read back")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, generation and delivery settings, and DB readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Replay a scripted guest and approver conversation in memory")]
    Simulate,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Simulate => commands::simulate::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
