use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::web::Reply;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    AppMention(MessageEvent),
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::AppMention(_) => SlackEventType::AppMention,
            Self::Message(_) => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    pub fn message(&self) -> Option<&MessageEvent> {
        match self {
            Self::AppMention(event) | Self::Message(event) => Some(event),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    AppMention,
    Message,
    Unsupported,
}

/// Shared shape of `app_mention` and `message` events.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
}

impl MessageEvent {
    /// Timestamp a threaded reply should hang off: the enclosing thread when
    /// the message is already inside one, otherwise the message itself.
    pub fn thread_anchor(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

/// One decoded Socket Mode frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("socket frame is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("`{frame_type}` frame carries no envelope_id")]
    MissingEnvelopeId { frame_type: String },
    #[error("`{event_type}` event is missing `{field}`")]
    MissingField { event_type: String, field: &'static str },
    /// The envelope itself is well formed, so it can still be acked.
    #[error("envelope `{envelope_id}` carries an undecodable event: {source}")]
    Event { envelope_id: String, source: Box<EventDecodeError> },
}

impl EventDecodeError {
    /// Envelope id of a frame that was readable enough to acknowledge.
    pub fn envelope_id(&self) -> Option<&str> {
        match self {
            Self::Event { envelope_id, .. } => Some(envelope_id),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
}

pub fn decode_frame(raw: &str) -> Result<SocketFrame, EventDecodeError> {
    let frame: RawFrame = serde_json::from_str(raw)?;

    match frame.frame_type.as_str() {
        "hello" => return Ok(SocketFrame::Hello),
        "disconnect" => {
            return Ok(SocketFrame::Disconnect {
                reason: frame.reason.unwrap_or_else(|| "unknown".to_owned()),
            })
        }
        _ => {}
    }

    let envelope_id = frame
        .envelope_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| EventDecodeError::MissingEnvelopeId {
            frame_type: frame.frame_type.clone(),
        })?;

    let event = if frame.frame_type == "events_api" {
        decode_callback_event(frame.payload).map_err(|source| EventDecodeError::Event {
            envelope_id: envelope_id.clone(),
            source: Box::new(source),
        })?
    } else {
        SlackEvent::Unsupported { event_type: frame.frame_type }
    };

    Ok(SocketFrame::Envelope(SlackEnvelope { envelope_id, event }))
}

fn decode_callback_event(mut payload: Value) -> Result<SlackEvent, EventDecodeError> {
    let Some(inner) = payload.get_mut("event").map(Value::take) else {
        let event_type = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("events_api")
            .to_owned();
        return Ok(SlackEvent::Unsupported { event_type });
    };

    let raw: RawEvent = serde_json::from_value(inner)?;
    match raw.event_type.as_str() {
        "app_mention" => Ok(SlackEvent::AppMention(message_event(raw)?)),
        "message" => Ok(SlackEvent::Message(message_event(raw)?)),
        _ => Ok(SlackEvent::Unsupported { event_type: raw.event_type }),
    }
}

fn message_event(raw: RawEvent) -> Result<MessageEvent, EventDecodeError> {
    let channel_id = raw.channel.ok_or_else(|| EventDecodeError::MissingField {
        event_type: raw.event_type.clone(),
        field: "channel",
    })?;
    let ts = raw.ts.ok_or_else(|| EventDecodeError::MissingField {
        event_type: raw.event_type.clone(),
        field: "ts",
    })?;

    Ok(MessageEvent {
        channel_id,
        user_id: raw.user.unwrap_or_default(),
        text: raw.text.unwrap_or_default(),
        ts,
        thread_ts: raw.thread_ts,
        bot_id: raw.bot_id,
        subtype: raw.subtype,
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Replied(Reply),
    /// The reply was composed but Slack did not accept it.
    DeliveryFailed(Reply),
    Ignored,
}

/// Handles the event kinds the bot subscribes to. Implementations absorb
/// their own failures; nothing a handler does may stop the event loop.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_mention(&self, event: &MessageEvent, ctx: &EventContext) -> HandlerResult;
    async fn handle_message(&self, event: &MessageEvent, ctx: &EventContext) -> HandlerResult;
}

#[derive(Clone)]
pub struct EventDispatcher {
    handler: Arc<dyn EventHandler>,
}

impl EventDispatcher {
    pub fn new<H>(handler: H) -> Self
    where
        H: EventHandler + 'static,
    {
        Self { handler: Arc::new(handler) }
    }

    pub async fn dispatch(&self, envelope: &SlackEnvelope, ctx: &EventContext) -> HandlerResult {
        match &envelope.event {
            SlackEvent::AppMention(event) => self.handler.handle_mention(event, ctx).await,
            SlackEvent::Message(event) => self.handler.handle_message(event, ctx).await,
            SlackEvent::Unsupported { event_type } => {
                debug!(
                    envelope_id = %envelope.envelope_id,
                    event_type = %event_type,
                    "ignoring unsupported slack event"
                );
                HandlerResult::Ignored
            }
        }
    }
}
