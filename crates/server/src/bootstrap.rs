use std::sync::Arc;

use slackdify_agent::{AnswerClient, AnswerError, DifyClient};
use slackdify_core::{
    config::{AppConfig, ConfigError, LoadOptions},
    errors::FailureKind,
};
use slackdify_slack::{
    identity::BotIdentity,
    responder::{ReplyStrategy, Responder},
    socket::{ReconnectPolicy, SocketModeRunner},
    transport::SocketModeTransport,
    web::{SlackWebClient, WebApiError},
    EventDispatcher,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub identity: BotIdentity,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not resolve bot identity via auth.test: {0}")]
    Identity(#[source] WebApiError),
    #[error("answer service could not be configured: {0}")]
    AnswerService(#[source] AnswerError),
}

impl BootstrapError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Config(_) | Self::AnswerService(_) => FailureKind::StartupConfiguration,
            Self::Identity(_) => FailureKind::IdentityResolution,
        }
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wires the bot from an already validated config. The only network call made
/// here is `auth.test`; the socket is opened later by the runner.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let answer_client = if config.bot.mode.requires_answer_service() {
        let client: Arc<dyn AnswerClient> = Arc::new(
            DifyClient::from_config(&config.dify).map_err(BootstrapError::AnswerService)?,
        );
        Some(client)
    } else {
        None
    };
    let strategy = ReplyStrategy::for_mode(config.bot.mode, answer_client).ok_or_else(|| {
        BootstrapError::AnswerService(AnswerError::Configuration(format!(
            "mode `{}` has no answer client",
            config.bot.mode.as_str()
        )))
    })?;

    let web = SlackWebClient::from_config(&config.slack);
    let identity = web.resolve_identity().await.map_err(BootstrapError::Identity)?;
    info!(
        event_name = "system.bootstrap.identity_resolved",
        correlation_id = "bootstrap",
        bot_user_id = %identity,
        "bot identity resolved"
    );

    let responder = Responder::new(identity.clone(), strategy, Arc::new(web.clone()));
    let transport = SocketModeTransport::new(web, config.slack.app_token.clone());
    let slack_runner = SocketModeRunner::new(
        Arc::new(transport),
        EventDispatcher::new(responder),
        ReconnectPolicy::default(),
    );
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        mode = config.bot.mode.as_str(),
        "slack runner initialized"
    );

    Ok(Application { config, identity, slack_runner })
}
