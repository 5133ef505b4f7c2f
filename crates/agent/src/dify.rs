use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use slackdify_core::config::DifyConfig;
use tracing::{debug, info, warn};

use crate::llm::{AnswerClient, AnswerError};

const RESPONSE_MODE_BLOCKING: &str = "blocking";

/// Body of a Dify `chat-messages` request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatMessageRequest<'a> {
    pub inputs: Map<String, Value>,
    pub query: &'a str,
    pub response_mode: &'static str,
    pub user: &'a str,
}

impl<'a> ChatMessageRequest<'a> {
    pub fn blocking(query: &'a str, user: &'a str) -> Self {
        Self { inputs: Map::new(), query, response_mode: RESPONSE_MODE_BLOCKING, user }
    }
}

/// Blocking-mode response. Only `answer` is handed back to callers.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChatMessageResponse {
    pub answer: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Clone)]
pub struct DifyClient {
    http: reqwest::Client,
    api_url: String,
    api_key: SecretString,
}

impl DifyClient {
    pub fn new(api_url: impl Into<String>, api_key: SecretString) -> Self {
        Self { http: reqwest::Client::new(), api_url: api_url.into(), api_key }
    }

    pub fn from_config(config: &DifyConfig) -> Result<Self, AnswerError> {
        let api_url = config
            .api_url
            .clone()
            .ok_or_else(|| AnswerError::Configuration("dify.api_url is unset".to_string()))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AnswerError::Configuration("dify.api_key is unset".to_string()))?;
        Ok(Self::new(api_url, api_key))
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn send(&self, query: &str, user: &str) -> Result<ChatMessageResponse, AnswerError> {
        let request = ChatMessageRequest::blocking(query, user);
        info!(
            event_name = "egress.dify.request",
            user = %user,
            query_chars = query.chars().count(),
            "sending dify chat message"
        );

        let response = self
            .http
            .post(self.api_url.as_str())
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        // Blocking mode answers with exactly 200; anything else carries no answer.
        if status != reqwest::StatusCode::OK {
            warn!(
                event_name = "egress.dify.response",
                status = status.as_u16(),
                body = %body,
                "dify returned unexpected status"
            );
            return Err(AnswerError::Status { status: status.as_u16(), body });
        }

        Ok(serde_json::from_str::<ChatMessageResponse>(&body)?)
    }
}

#[async_trait]
impl AnswerClient for DifyClient {
    async fn answer(&self, query: &str, user: &str) -> Result<String, AnswerError> {
        let response = self.send(query, user).await.map_err(|error| {
            warn!(event_name = "egress.dify.failed", error = %error, "dify request failed");
            error
        })?;

        // Each call opens a fresh conversation; the id is not carried forward.
        debug!(
            event_name = "egress.dify.response",
            conversation_id = response.conversation_id.as_deref().unwrap_or("unknown"),
            message_id = response.message_id.as_deref().unwrap_or("unknown"),
            "dify answer received"
        );
        Ok(response.answer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};
    use slackdify_core::config::DifyConfig;
    use tokio::sync::Mutex;

    use super::{ChatMessageRequest, DifyClient};
    use crate::llm::{AnswerClient, AnswerError};

    #[derive(Clone)]
    struct StubDify {
        status: StatusCode,
        body: &'static str,
        seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    }

    async fn chat_messages(
        State(stub): State<StubDify>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, String) {
        let authorization =
            headers.get("authorization").and_then(|value| value.to_str().ok()).map(str::to_owned);
        stub.seen.lock().await.push((authorization, body));
        (stub.status, stub.body.to_owned())
    }

    async fn spawn_stub(status: StatusCode, body: &'static str) -> (String, StubDify) {
        let stub = StubDify { status, body, seen: Arc::new(Mutex::new(Vec::new())) };
        let router =
            Router::new().route("/v1/chat-messages", post(chat_messages)).with_state(stub.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let address = listener.local_addr().expect("stub address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        (format!("http://{address}/v1/chat-messages"), stub)
    }

    fn client(url: &str) -> DifyClient {
        DifyClient::new(url, "app-test-key".to_string().into())
    }

    #[test]
    fn request_body_matches_blocking_contract() {
        let body = serde_json::to_value(ChatMessageRequest::blocking("what is six by seven", "U1"))
            .expect("serialize");
        assert_eq!(
            body,
            json!({
                "inputs": {},
                "query": "what is six by seven",
                "response_mode": "blocking",
                "user": "U1",
            })
        );
    }

    #[tokio::test]
    async fn returns_answer_field_and_sends_bearer_key() {
        let (url, stub) =
            spawn_stub(StatusCode::OK, r#"{"answer":"42","conversation_id":"c1"}"#).await;

        let answer = client(&url).answer("meaning of life", "U42").await.expect("answer");
        assert_eq!(answer, "42");

        let seen = stub.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("Bearer app-test-key"));
        assert_eq!(seen[0].1["query"], "meaning of life");
        assert_eq!(seen[0].1["user"], "U42");
        assert_eq!(seen[0].1["response_mode"], "blocking");
        assert_eq!(seen[0].1["inputs"], json!({}));
    }

    #[tokio::test]
    async fn full_blocking_response_decodes() {
        let (url, _stub) = spawn_stub(
            StatusCode::OK,
            r#"{"event":"message","message_id":"m1","conversation_id":"c1","mode":"chat",
                "answer":"hello","metadata":{"usage":{}},"created_at":1705407629}"#,
        )
        .await;

        let answer = client(&url).answer("hi", "U1").await.expect("answer");
        assert_eq!(answer, "hello");
    }

    #[tokio::test]
    async fn server_error_is_reported_with_status() {
        let (url, _stub) = spawn_stub(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").await;

        let error = client(&url).answer("q", "U1").await.expect_err("500 should fail");
        assert!(matches!(
            error,
            AnswerError::Status { status: 500, ref body } if body == "upstream exploded"
        ));
    }

    #[tokio::test]
    async fn non_200_success_status_is_still_a_failure() {
        let (url, _stub) = spawn_stub(StatusCode::ACCEPTED, r#"{"answer":"queued"}"#).await;

        let error = client(&url).answer("q", "U1").await.expect_err("202 should fail");
        assert!(matches!(error, AnswerError::Status { status: 202, .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_failure() {
        let (url, _stub) = spawn_stub(StatusCode::OK, "{not json").await;

        let error = client(&url).answer("q", "U1").await.expect_err("bad json should fail");
        assert!(matches!(error, AnswerError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        drop(listener);

        let error = client(&format!("http://{address}/v1/chat-messages"))
            .answer("q", "U1")
            .await
            .expect_err("closed port should fail");
        assert!(matches!(error, AnswerError::Transport(_)));
    }

    #[test]
    fn from_config_requires_url_and_key() {
        let missing = DifyClient::from_config(&DifyConfig { api_key: None, api_url: None });
        assert!(matches!(missing, Err(AnswerError::Configuration(_))));

        let configured = DifyClient::from_config(&DifyConfig {
            api_key: Some("k".to_string().into()),
            api_url: Some("https://dify.example/v1/chat-messages".to_string()),
        })
        .expect("configured client");
        assert_eq!(configured.api_url(), "https://dify.example/v1/chat-messages");
    }
}
