use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use slackdify_core::config::SlackConfig;
use thiserror::Error;
use tracing::debug;

use crate::identity::BotIdentity;

/// One outbound `chat.postMessage` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Reply {
    #[serde(rename = "channel")]
    pub channel_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl Reply {
    pub fn in_channel(channel_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { channel_id: channel_id.into(), text: text.into(), thread_ts: None }
    }

    pub fn in_thread(
        channel_id: impl Into<String>,
        text: impl Into<String>,
        thread_ts: impl Into<String>,
    ) -> Self {
        Self { channel_id: channel_id.into(), text: text.into(), thread_ts: Some(thread_ts.into()) }
    }
}

#[derive(Debug, Error)]
pub enum WebApiError {
    #[error("slack web api request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack `{method}` failed: {error}")]
    Api { method: &'static str, error: String },
    #[error("slack `{method}` response could not be decoded: {source}")]
    Decode { method: &'static str, source: serde_json::Error },
}

#[async_trait]
pub trait MessagePoster: Send + Sync {
    async fn post_message(&self, reply: &Reply) -> Result<(), WebApiError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AuthTest {
    pub user_id: String,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpen {
    url: String,
}

#[derive(Clone)]
pub struct SlackWebClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(base_url: impl Into<String>, bot_token: SecretString) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http: reqwest::Client::new(), base_url, bot_token }
    }

    pub fn from_config(config: &SlackConfig) -> Self {
        Self::new(config.api_base_url.clone(), config.bot_token.clone())
    }

    pub async fn auth_test(&self) -> Result<AuthTest, WebApiError> {
        self.call("auth.test", &self.bot_token, None::<&Value>).await
    }

    pub async fn resolve_identity(&self) -> Result<BotIdentity, WebApiError> {
        let auth = self.auth_test().await?;
        debug!(
            user_id = %auth.user_id,
            bot_id = auth.bot_id.as_deref().unwrap_or("unknown"),
            team = auth.team.as_deref().unwrap_or("unknown"),
            "resolved bot identity"
        );
        Ok(BotIdentity::new(auth.user_id))
    }

    /// Asks Slack for a fresh Socket Mode WebSocket URL. Needs the app-level token.
    pub async fn open_connection(&self, app_token: &SecretString) -> Result<String, WebApiError> {
        let opened: ConnectionsOpen =
            self.call("apps.connections.open", app_token, None::<&Value>).await?;
        Ok(opened.url)
    }

    async fn call<T, B>(
        &self,
        method: &'static str,
        token: &SecretString,
        body: Option<&B>,
    ) -> Result<T, WebApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut request = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        let payload: Value = request.send().await?.json().await?;
        if payload.get("ok").and_then(Value::as_bool) != Some(true) {
            let error =
                payload.get("error").and_then(Value::as_str).unwrap_or("unknown").to_owned();
            return Err(WebApiError::Api { method, error });
        }

        serde_json::from_value(payload).map_err(|source| WebApiError::Decode { method, source })
    }
}

#[async_trait]
impl MessagePoster for SlackWebClient {
    async fn post_message(&self, reply: &Reply) -> Result<(), WebApiError> {
        let _: Value = self.call("chat.postMessage", &self.bot_token, Some(reply)).await?;
        Ok(())
    }
}
