use std::process::ExitCode;

fn main() -> ExitCode {
    casebot_cli::run()
}
