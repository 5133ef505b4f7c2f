mod bootstrap;

use anyhow::Result;
use slackdify_core::{
    config::{AppConfig, LoadOptions},
    errors::FailureKind,
};

fn init_logging(config: &AppConfig) {
    use slackdify_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // A missing .env is normal in deployed environments.
    dotenvy::dotenv().ok();

    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        eprintln!("{}: {error}", FailureKind::StartupConfiguration);
        error
    })?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await.map_err(|error| {
        tracing::error!(
            event_name = "system.bootstrap.failed",
            failure_kind = error.failure_kind().as_str(),
            correlation_id = "bootstrap",
            error = %error,
            "bootstrap failed"
        );
        error
    })?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bot_user_id = %app.identity,
        mode = app.config.bot.mode.as_str(),
        "slackdify-server started"
    );

    tokio::select! {
        result = app.slack_runner.start() => result?,
        result = wait_for_shutdown() => result?,
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "slackdify-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
