use std::process::ExitCode;

fn main() -> ExitCode {
    agrivision_cli::run()
}
