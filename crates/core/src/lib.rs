pub mod config;
pub mod errors;

pub use config::{AppConfig, BotMode, ConfigError, LoadOptions, LogFormat};
pub use errors::{FailureKind, APP_FAILURE_MESSAGE};
