use std::process::ExitCode;

fn main() -> ExitCode {
    pesto_cli::run()
}
