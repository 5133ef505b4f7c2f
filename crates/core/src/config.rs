use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_SLACK_APP_TOKEN: &str = "SLACK_APP_TOKEN";
pub const ENV_SLACK_BOT_TOKEN: &str = "SLACK_BOT_TOKEN";
pub const ENV_SLACK_API_BASE_URL: &str = "SLACKDIFY_SLACK_API_BASE_URL";
pub const ENV_DIFY_API_KEY: &str = "DIFY_API_KEY";
pub const ENV_DIFY_API_URL: &str = "DIFY_API_URL";
pub const ENV_BOT_MODE: &str = "SLACKDIFY_MODE";
pub const ENV_LOG_LEVEL: &str = "SLACKDIFY_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "SLACKDIFY_LOG_FORMAT";

pub const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub slack: SlackConfig,
    pub dify: DifyConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub mode: BotMode,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct DifyConfig {
    pub api_key: Option<SecretString>,
    pub api_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Which reply the bot produces for an inbound event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotMode {
    /// Forward the cleaned query to Dify and post its answer.
    Dify,
    /// Replace the cleaned query with mask characters.
    Mask,
    /// Prefix the raw text with a fixed greeting.
    Echo,
    /// Canned Japanese greetings for mentions and `hello` messages.
    Greeting,
}

impl BotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dify => "dify",
            Self::Mask => "mask",
            Self::Echo => "echo",
            Self::Greeting => "greeting",
        }
    }

    pub fn requires_answer_service(&self) -> bool {
        matches!(self, Self::Dify)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bot_mode: Option<BotMode>,
    pub log_level: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_api_base_url: Option<String>,
    pub dify_api_key: Option<String>,
    pub dify_api_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot: BotConfig { mode: BotMode::Dify },
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                api_base_url: DEFAULT_SLACK_API_BASE_URL.to_string(),
            },
            dify: DifyConfig { api_key: None, api_url: None },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for BotMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dify" => Ok(Self::Dify),
            "mask" => Ok(Self::Mask),
            "echo" => Ok(Self::Echo),
            "greeting" => Ok(Self::Greeting),
            other => Err(ConfigError::Validation(format!(
                "unsupported bot mode `{other}` (expected dify|mask|echo|greeting)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("slackdify.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(bot) = patch.bot {
            if let Some(mode) = bot.mode {
                self.bot.mode = mode;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(slack_app_token_value) = slack.app_token {
                self.slack.app_token = secret_value(slack_app_token_value);
            }
            if let Some(slack_bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(slack_bot_token_value);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(dify) = patch.dify {
            if let Some(dify_api_key_value) = dify.api_key {
                self.dify.api_key = Some(secret_value(dify_api_key_value));
            }
            if let Some(api_url) = dify.api_url {
                self.dify.api_url = Some(api_url);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env(ENV_BOT_MODE) {
            self.bot.mode = value.parse()?;
        }

        if let Some(value) = read_env(ENV_SLACK_APP_TOKEN) {
            self.slack.app_token = secret_value(value);
        }
        if let Some(value) = read_env(ENV_SLACK_BOT_TOKEN) {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env(ENV_SLACK_API_BASE_URL) {
            self.slack.api_base_url = value;
        }

        if let Some(value) = read_env(ENV_DIFY_API_KEY) {
            self.dify.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env(ENV_DIFY_API_URL) {
            self.dify.api_url = Some(value);
        }

        if let Some(value) = read_env(ENV_LOG_LEVEL) {
            self.logging.level = value;
        }
        if let Some(value) = read_env(ENV_LOG_FORMAT) {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_mode) = overrides.bot_mode {
            self.bot.mode = bot_mode;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(slack_app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(slack_app_token);
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(slack_api_base_url) = overrides.slack_api_base_url {
            self.slack.api_base_url = slack_api_base_url;
        }
        if let Some(dify_api_key) = overrides.dify_api_key {
            self.dify.api_key = Some(secret_value(dify_api_key));
        }
        if let Some(dify_api_url) = overrides.dify_api_url {
            self.dify.api_url = Some(dify_api_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        if self.bot.mode.requires_answer_service() {
            validate_dify(&self.dify)?;
        }
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("slackdify.toml"), PathBuf::from("config/slackdify.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret();
    if app_token.is_empty() {
        return Err(ConfigError::Validation(format!(
            "slack.app_token is required (set {ENV_SLACK_APP_TOKEN}). Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens"
        )));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(format!(
            "slack.bot_token is required (set {ENV_SLACK_BOT_TOKEN}). Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token"
        )));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    validate_http_url("slack.api_base_url", &slack.api_base_url)
}

fn validate_dify(dify: &DifyConfig) -> Result<(), ConfigError> {
    let missing_key =
        dify.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    if missing_key {
        return Err(ConfigError::Validation(format!(
            "dify.api_key is required in dify mode (set {ENV_DIFY_API_KEY})"
        )));
    }

    let Some(api_url) = dify.api_url.as_deref().filter(|value| !value.trim().is_empty()) else {
        return Err(ConfigError::Validation(format!(
            "dify.api_url is required in dify mode (set {ENV_DIFY_API_URL})"
        )));
    };

    validate_http_url("dify.api_url", api_url)
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    bot: Option<BotPatch>,
    slack: Option<SlackPatch>,
    dify: Option<DifyPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BotPatch {
    mode: Option<BotMode>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DifyPatch {
    api_key: Option<String>,
    api_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
