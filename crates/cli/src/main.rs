use std::process::ExitCode;

fn main() -> ExitCode {
    embudo_cli::run()
}
