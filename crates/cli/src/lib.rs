pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "slackdify",
    about = "Slackdify operator CLI",
    long_about = "Inspect configuration, check Slack and Dify readiness, and query the answer service directly.",
    after_help = "Examples:\n  slackdify doctor --json\n  slackdify config\n  slackdify ask \"what is 6*7?\""
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
    #[command(about = "Validate config and check that Slack accepts the bot token")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Send one query to the answer service and print the answer")]
    Ask {
        #[arg(help = "Question to send, exactly as a Slack user would type it")]
        query: String,
        #[arg(
            long,
            default_value = commands::ask::DEFAULT_USER,
            help = "User id reported to the answer service"
        )]
        user: String,
    },
}

pub fn run() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Ask { query, user } => commands::ask::run(&query, &user),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
