//! Slack Integration - Socket Mode bot interface
//!
//! This crate provides the Slack side of slackdify:
//! - **Socket Mode** (`socket`, `transport`) - WebSocket connection to Slack
//!   (no public URL needed), acks, and reconnection with backoff
//! - **Events** (`events`) - Envelope decoding and routing of `app_mention`
//!   and `message` events
//! - **Web API** (`web`) - `auth.test`, `apps.connections.open`, `chat.postMessage`
//! - **Responder** (`responder`) - Mask, echo, greeting and delegated-answer replies
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to `app_mention` and `message.channels`
//! 3. Set env vars: `SLACK_APP_TOKEN` (`xapp-`), `SLACK_BOT_TOKEN` (`xoxb-`)
//!
//! # Architecture
//!
//! ```text
//! WebSocket → reader task → mpsc → SocketModeRunner → ack → EventDispatcher
//!                                                              ↓
//!                          chat.postMessage ← Responder ← ReplyStrategy
//! ```
//!
//! # Key Types
//!
//! - `SocketModeRunner` - Event loop with reconnection logic
//! - `EventDispatcher` - Routes events to the handler
//! - `Responder` - The one `EventHandler` the bot runs
//! - `SlackWebClient` - Web API calls with the bot token

pub mod events;
pub mod identity;
pub mod responder;
pub mod socket;
pub mod transport;
pub mod web;

pub use events::{EventDispatcher, SlackEnvelope, SlackEvent};
pub use identity::BotIdentity;
pub use responder::{ReplyStrategy, Responder};
pub use socket::{ReconnectPolicy, SocketError, SocketModeRunner};
pub use transport::SocketModeTransport;
pub use web::{MessagePoster, Reply, SlackWebClient, WebApiError};
