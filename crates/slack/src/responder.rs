use std::sync::Arc;

use async_trait::async_trait;
use slackdify_agent::AnswerClient;
use slackdify_core::{
    config::BotMode,
    errors::{FailureKind, APP_FAILURE_MESSAGE},
};
use tracing::{debug, info, warn};

use crate::{
    events::{EventContext, EventHandler, HandlerResult, MessageEvent},
    identity::BotIdentity,
    web::{MessagePoster, Reply},
};

pub const MASK_CHAR: char = '*';
pub const ECHO_PREFIX: &str = "Hello, you said: ";
const GREETING_TRIGGER: &str = "hello";

/// Removes every occurrence of the bot's own mention token and trims what is left.
pub fn strip_self_mention(text: &str, identity: &BotIdentity) -> String {
    text.replace(&identity.mention(), "").trim().to_owned()
}

pub fn mask(query: &str) -> String {
    std::iter::repeat(MASK_CHAR).take(query.chars().count()).collect()
}

pub fn echo(raw_text: &str) -> String {
    format!("{ECHO_PREFIX}{raw_text}")
}

pub fn greet_mention(user_id: &str) -> String {
    format!("はい、<@{user_id}>さん。何かお手伝いできますか？")
}

pub fn greet_message(user_id: &str) -> String {
    format!("こんにちは、<@{user_id}>さん！")
}

#[derive(Clone)]
pub enum ReplyStrategy {
    Mask,
    Echo,
    Greeting,
    Answer(Arc<dyn AnswerClient>),
}

impl ReplyStrategy {
    /// Builds the strategy for `mode`. Only dify mode consults `answer_client`.
    pub fn for_mode(mode: BotMode, answer_client: Option<Arc<dyn AnswerClient>>) -> Option<Self> {
        match mode {
            BotMode::Mask => Some(Self::Mask),
            BotMode::Echo => Some(Self::Echo),
            BotMode::Greeting => Some(Self::Greeting),
            BotMode::Dify => answer_client.map(Self::Answer),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mask => "mask",
            Self::Echo => "echo",
            Self::Greeting => "greeting",
            Self::Answer(_) => "answer",
        }
    }
}

impl std::fmt::Debug for ReplyStrategy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.name())
    }
}

pub struct Responder {
    identity: BotIdentity,
    strategy: ReplyStrategy,
    poster: Arc<dyn MessagePoster>,
}

impl Responder {
    pub fn new(
        identity: BotIdentity,
        strategy: ReplyStrategy,
        poster: Arc<dyn MessagePoster>,
    ) -> Self {
        Self { identity, strategy, poster }
    }

    fn should_skip_message(&self, event: &MessageEvent) -> Option<&'static str> {
        if event.subtype.is_some() {
            Some("message_subtype")
        } else if event.bot_id.is_some() {
            Some("bot_message")
        } else if event.user_id == self.identity.user_id() {
            Some("own_message")
        } else if event.text.contains(&self.identity.mention()) {
            Some("handled_as_mention")
        } else {
            None
        }
    }

    async fn compose_answer(
        &self,
        client: &dyn AnswerClient,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Reply {
        let query = strip_self_mention(&event.text, &self.identity);
        let text = match client.answer(&query, &event.user_id).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(
                    event_name = "egress.dify.request",
                    failure_kind = FailureKind::AnswerService.as_str(),
                    correlation_id = %ctx.correlation_id,
                    channel_id = %event.channel_id,
                    error = %error,
                    "answer service failed; replying with fallback"
                );
                FailureKind::AnswerService.user_message().unwrap_or(APP_FAILURE_MESSAGE).to_owned()
            }
        };
        Reply::in_thread(&event.channel_id, text, event.thread_anchor())
    }

    async fn deliver(&self, reply: Reply, ctx: &EventContext) -> HandlerResult {
        match self.poster.post_message(&reply).await {
            Ok(()) => {
                info!(
                    event_name = "egress.slack.reply_posted",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %reply.channel_id,
                    thread_id = reply.thread_ts.as_deref().unwrap_or("none"),
                    strategy = self.strategy.name(),
                    "posted slack reply"
                );
                HandlerResult::Replied(reply)
            }
            Err(error) => {
                warn!(
                    event_name = "egress.slack.reply_posted",
                    failure_kind = FailureKind::ReplyDelivery.as_str(),
                    correlation_id = %ctx.correlation_id,
                    channel_id = %reply.channel_id,
                    error = %error,
                    "failed to post slack reply"
                );
                HandlerResult::DeliveryFailed(reply)
            }
        }
    }
}

#[async_trait]
impl EventHandler for Responder {
    async fn handle_mention(&self, event: &MessageEvent, ctx: &EventContext) -> HandlerResult {
        let reply = match &self.strategy {
            ReplyStrategy::Mask => {
                let query = strip_self_mention(&event.text, &self.identity);
                Reply::in_thread(&event.channel_id, mask(&query), event.thread_anchor())
            }
            ReplyStrategy::Echo => Reply::in_channel(&event.channel_id, echo(&event.text)),
            ReplyStrategy::Greeting => {
                Reply::in_channel(&event.channel_id, greet_mention(&event.user_id))
            }
            ReplyStrategy::Answer(client) => self.compose_answer(client.as_ref(), event, ctx).await,
        };
        self.deliver(reply, ctx).await
    }

    async fn handle_message(&self, event: &MessageEvent, ctx: &EventContext) -> HandlerResult {
        if let Some(reason) = self.should_skip_message(event) {
            debug!(correlation_id = %ctx.correlation_id, reason, "skipping message event");
            return HandlerResult::Ignored;
        }

        let reply = match &self.strategy {
            ReplyStrategy::Mask => {
                let query = strip_self_mention(&event.text, &self.identity);
                Reply::in_thread(&event.channel_id, mask(&query), event.thread_anchor())
            }
            ReplyStrategy::Echo => Reply::in_channel(&event.channel_id, echo(&event.text)),
            ReplyStrategy::Greeting if event.text.contains(GREETING_TRIGGER) => {
                Reply::in_channel(&event.channel_id, greet_message(&event.user_id))
            }
            ReplyStrategy::Greeting | ReplyStrategy::Answer(_) => return HandlerResult::Ignored,
        };
        self.deliver(reply, ctx).await
    }
}
