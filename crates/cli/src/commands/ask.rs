use slackdify_agent::{AnswerClient, DifyClient};
use slackdify_core::config::{AppConfig, BotMode, ConfigOverrides, LoadOptions};

use crate::commands::{CommandResult, EXIT_ANSWER_SERVICE, EXIT_CONFIG};

pub const DEFAULT_USER: &str = "slackdify-cli";

/// Calls the answer service once, the same way a mention in Slack would,
/// without touching Slack at all.
pub fn run(query: &str, user: &str) -> CommandResult {
    // Dify settings are mandatory here whatever mode the bot runs in.
    let options = LoadOptions {
        overrides: ConfigOverrides { bot_mode: Some(BotMode::Dify), ..ConfigOverrides::default() },
        ..LoadOptions::default()
    };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let client = match DifyClient::from_config(&config.dify) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                error.to_string(),
                EXIT_CONFIG,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_ANSWER_SERVICE,
            );
        }
    };

    match runtime.block_on(client.answer(query, user)) {
        Ok(answer) => CommandResult::success("ask", answer),
        Err(error) => {
            CommandResult::failure("ask", "answer_service", error.to_string(), EXIT_ANSWER_SERVICE)
        }
    }
}
