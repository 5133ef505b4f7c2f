//! Answer service - natural-language answers for Slack messages
//!
//! This crate provides the outbound half of the bot's delegated-answer mode:
//! - **Answer client trait** (`llm`) - `AnswerClient`, the seam the Slack
//!   responder depends on, plus the single `AnswerError` failure type
//! - **Dify client** (`dify`) - blocking `chat-messages` calls authenticated
//!   with a bearer API key
//!
//! # Conversation state
//!
//! Every call starts a fresh Dify conversation. The `conversation_id` in the
//! response is parsed for logging and then dropped.

pub mod dify;
pub mod llm;

pub use dify::DifyClient;
pub use llm::{AnswerClient, AnswerError};
