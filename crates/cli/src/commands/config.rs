use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use slackdify_core::config::{
    resolve_config_path, AppConfig, LoadOptions, ENV_BOT_MODE, ENV_DIFY_API_KEY, ENV_DIFY_API_URL,
    ENV_LOG_FORMAT, ENV_LOG_LEVEL, ENV_SLACK_API_BASE_URL, ENV_SLACK_APP_TOKEN,
    ENV_SLACK_BOT_TOKEN,
};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_OK};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    CommandResult::raw(EXIT_OK, render(&config))
}

pub fn render(config: &AppConfig) -> String {
    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let dify_api_key = if config.dify.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let fields = [
        ("bot.mode", config.bot.mode.as_str().to_string(), ENV_BOT_MODE),
        (
            "slack.app_token",
            redact_token(config.slack.app_token.expose_secret()),
            ENV_SLACK_APP_TOKEN,
        ),
        (
            "slack.bot_token",
            redact_token(config.slack.bot_token.expose_secret()),
            ENV_SLACK_BOT_TOKEN,
        ),
        ("slack.api_base_url", config.slack.api_base_url.clone(), ENV_SLACK_API_BASE_URL),
        (
            "dify.api_url",
            config.dify.api_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            ENV_DIFY_API_URL,
        ),
        ("dify.api_key", dify_api_key.to_string(), ENV_DIFY_API_KEY),
        ("logging.level", config.logging.level.clone(), ENV_LOG_LEVEL),
        ("logging.format", format!("{:?}", config.logging.format), ENV_LOG_FORMAT),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value, env_key) in fields {
        lines.push(render_line(key_path, &value, source(key_path, env_key)));
    }
    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    // Blank env values are ignored by the loader, so they do not count here either.
    if env::var(env_key).map(|value| !value.trim().is_empty()).unwrap_or(false) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
