use std::process::ExitCode;

fn main() -> ExitCode {
    slackdify_cli::run()
}
