use async_trait::async_trait;
use thiserror::Error;

/// Everything that can go wrong while asking the answer service. Callers
/// treat every variant the same way; the split only exists for diagnostics.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("answer service is not configured: {0}")]
    Configuration(String),
    #[error("answer service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("answer service returned HTTP {status}")]
    Status { status: u16, body: String },
    #[error("answer service response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait AnswerClient: Send + Sync {
    /// Submits `query` on behalf of `user` and returns the generated answer.
    async fn answer(&self, query: &str, user: &str) -> Result<String, AnswerError>;
}
