pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "casebot",
    about = "Casebot operator CLI",
    long_about = "Apply migrations, check runtime readiness and report the state of tracked \
                  support cases.",
    after_help = "Examples:\n  casebot migrate\n  casebot doctor --json\n  casebot sitrep"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, Slack token readiness, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the situation report over the stored canonical cases")]
    Sitrep {
        #[arg(long, help = "Wrap the report in a JSON command outcome")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Sitrep { json } => commands::sitrep::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
