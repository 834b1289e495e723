pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "embudo",
    about = "Embudo operator CLI",
    long_about = "Operate the WhatsApp sales funnel: migrations, configuration inspection, readiness checks, and conversation maintenance.",
    after_help = "Examples:\n  embudo doctor --json\n  embudo config\n  embudo smoke\n  embudo purge 593999000001@s.whatsapp.net"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Run end-to-end readiness checks with per-check timing details")]
    Smoke,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database, channel, and classifier readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Delete the stored conversation state for one WhatsApp identity")]
    Purge {
        #[arg(help = "Full identity, e.g. 593999000001@s.whatsapp.net")]
        identity: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Smoke => commands::smoke::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Purge { identity } => commands::purge::run(&identity),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
