use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{EventContext, EventDispatcher, HandlerResult, SlackEnvelope};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("socket mode gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: TransportError },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// `None` keeps reconnecting for as long as the process runs.
    pub max_retries: Option<u32>,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: None, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` means the stream is finished for good; errors trigger a reconnect.
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    /// Pumps envelopes until the transport reports a clean end of stream.
    /// Connection failures are retried with capped backoff; the attempt
    /// counter resets whenever a connection is established. Only a bounded
    /// policy can give up.
    pub async fn start(&self) -> Result<(), SocketError> {
        let mut attempt = 0;
        loop {
            let transport_error = match self.connect_and_pump(&mut attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => transport_error,
            };

            warn!(
                attempt,
                max_retries = ?self.reconnect_policy.max_retries,
                error = %transport_error,
                "socket mode transport failed"
            );

            if let Some(max_retries) = self.reconnect_policy.max_retries {
                if attempt >= max_retries {
                    warn!(max_retries, "socket mode retries exhausted");
                    return Err(SocketError::RetriesExhausted {
                        attempts: attempt + 1,
                        last_error: transport_error,
                    });
                }
            }

            let delay = self.reconnect_policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt = attempt.saturating_add(1);
        }
    }

    async fn connect_and_pump(&self, attempt: &mut u32) -> Result<(), TransportError> {
        info!(attempt = *attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        info!(attempt = *attempt, "socket mode transport connected");
        *attempt = 0;

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!("socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let (channel_id, thread_id) = correlation_fields(&envelope);

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                channel_id = channel_id.unwrap_or("unknown"),
                thread_id = thread_id.unwrap_or("unknown"),
                "received slack envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged slack envelope"
                );
            }

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            match self.dispatcher.dispatch(&envelope, &context).await {
                HandlerResult::Replied(_) => {}
                HandlerResult::DeliveryFailed(_) => warn!(
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "reply was not delivered; continuing socket loop"
                ),
                HandlerResult::Ignored => debug!(
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "envelope produced no reply"
                ),
            }
        }
    }
}

fn correlation_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    match envelope.event.message() {
        Some(event) => (Some(event.channel_id.as_str()), Some(event.thread_anchor())),
        None => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::{sync::Mutex, time::Instant};

    use super::{ReconnectPolicy, SocketError, SocketModeRunner, SocketTransport, TransportError};
    use crate::events::{
        EventContext, EventDispatcher, EventHandler, HandlerResult, MessageEvent, SlackEnvelope,
        SlackEvent,
    };

    type Journal = Arc<Mutex<Vec<String>>>;

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
        journal: Journal,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        connect_attempts: usize,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
            journal: Journal,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    connect_attempts: 0,
                    disconnect_calls: 0,
                }),
                journal,
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            self.journal.lock().await.push(format!("ack:{envelope_id}"));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            self.state.lock().await.disconnect_calls += 1;
            Ok(())
        }
    }

    struct JournalingHandler {
        journal: Journal,
    }

    #[async_trait]
    impl EventHandler for JournalingHandler {
        async fn handle_mention(&self, _event: &MessageEvent, ctx: &EventContext) -> HandlerResult {
            self.journal.lock().await.push(format!("mention:{}", ctx.correlation_id));
            HandlerResult::Ignored
        }

        async fn handle_message(&self, _event: &MessageEvent, ctx: &EventContext) -> HandlerResult {
            self.journal.lock().await.push(format!("message:{}", ctx.correlation_id));
            HandlerResult::Ignored
        }
    }

    fn no_delay(max_retries: Option<u32>) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    fn journaling(journal: &Journal) -> EventDispatcher {
        EventDispatcher::new(JournalingHandler { journal: journal.clone() })
    }

    fn connect_failures(count: usize) -> Vec<Result<(), TransportError>> {
        (0..count).map(|n| Err(TransportError::Connect(format!("outage-{n}")))).collect()
    }

    fn envelope(id: &str, event: SlackEvent) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(Some(SlackEnvelope { envelope_id: id.to_owned(), event }))
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let journal = Journal::default();
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![envelope("env-1", SlackEvent::Unsupported { event_type: "test".to_owned() })],
            journal.clone(),
        ));

        let runner =
            SocketModeRunner::new(transport.clone(), journaling(&journal), no_delay(Some(2)));

        runner.start().await.expect("runner should finish cleanly");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.disconnect_calls().await, 1);
        assert_eq!(*journal.lock().await, vec!["ack:env-1"]);
    }

    #[tokio::test]
    async fn keeps_reconnecting_through_a_long_outage() {
        let journal = Journal::default();
        let mut connects = connect_failures(25);
        connects.push(Ok(()));
        let transport = Arc::new(ScriptedTransport::with_script(
            connects,
            vec![envelope("env-9", SlackEvent::Unsupported { event_type: "test".to_owned() })],
            journal.clone(),
        ));

        let runner = SocketModeRunner::new(transport.clone(), journaling(&journal), no_delay(None));

        runner.start().await.expect("unbounded policy should outlast the outage");
        assert_eq!(transport.connect_attempts().await, 26);
        assert_eq!(*journal.lock().await, vec!["ack:env-9"]);
    }

    #[tokio::test(start_paused = true)]
    async fn default_policy_outlasts_minutes_of_failed_connects() {
        let journal = Journal::default();
        let mut connects = connect_failures(40);
        connects.push(Ok(()));
        let transport = Arc::new(ScriptedTransport::with_script(
            connects,
            vec![envelope("env-10", SlackEvent::Unsupported { event_type: "test".to_owned() })],
            journal.clone(),
        ));

        let runner = SocketModeRunner::new(
            transport.clone(),
            journaling(&journal),
            ReconnectPolicy::default(),
        );

        let started = Instant::now();
        runner.start().await.expect("default policy should never give up");

        assert!(started.elapsed() >= Duration::from_secs(180));
        assert_eq!(transport.connect_attempts().await, 41);
        assert_eq!(*journal.lock().await, vec!["ack:env-10"]);
    }

    #[tokio::test]
    async fn bounded_policy_surfaces_last_error() {
        let journal = Journal::default();
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
            journal.clone(),
        ));

        let runner =
            SocketModeRunner::new(transport.clone(), journaling(&journal), no_delay(Some(2)));

        let error = runner.start().await.expect_err("retries should run out");
        assert!(matches!(
            error,
            SocketError::RetriesExhausted {
                attempts: 3,
                last_error: TransportError::Connect(ref message),
            } if message == "fail-3"
        ));
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn read_failure_after_connect_reconnects_with_fresh_budget() {
        let journal = Journal::default();
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(()), Ok(())],
            vec![
                Err(TransportError::Receive("slack requested disconnect".to_owned())),
                Err(TransportError::Receive("socket closed by slack".to_owned())),
                envelope("env-2", SlackEvent::Unsupported { event_type: "test".to_owned() }),
            ],
            journal.clone(),
        ));

        let runner =
            SocketModeRunner::new(transport.clone(), journaling(&journal), no_delay(Some(1)));

        runner.start().await.expect("runner should survive a dropped connection");
        assert_eq!(transport.connect_attempts().await, 3);
        assert_eq!(*journal.lock().await, vec!["ack:env-2"]);
    }

    #[tokio::test]
    async fn acknowledges_before_dispatching_in_receipt_order() {
        let journal = Journal::default();
        let message = MessageEvent {
            channel_id: "C1".to_owned(),
            ts: "1.0".to_owned(),
            ..MessageEvent::default()
        };
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                envelope("env-a", SlackEvent::AppMention(message.clone())),
                envelope("env-b", SlackEvent::Message(message)),
                envelope("env-c", SlackEvent::Unsupported { event_type: "team_join".to_owned() }),
            ],
            journal.clone(),
        ));

        let runner = SocketModeRunner::new(transport, journaling(&journal), no_delay(Some(0)));

        runner.start().await.expect("runner should finish cleanly");
        assert_eq!(
            *journal.lock().await,
            vec!["ack:env-a", "mention:env-a", "ack:env-b", "message:env-b", "ack:env-c"]
        );
    }

    #[test]
    fn backoff_is_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_retries, None);
        assert_eq!(policy.backoff(0).as_millis(), 250);
        assert_eq!(policy.backoff(2).as_millis(), 1_000);
        assert_eq!(policy.backoff(10).as_millis(), 5_000);
    }

    #[test]
    fn extracts_channel_and_thread_correlation_fields() {
        let envelope = SlackEnvelope {
            envelope_id: "env-2".to_owned(),
            event: SlackEvent::AppMention(MessageEvent {
                channel_id: "C1".to_owned(),
                ts: "1730000000.2000".to_owned(),
                thread_ts: Some("1730000000.1000".to_owned()),
                ..MessageEvent::default()
            }),
        };

        let (channel_id, thread_id) = super::correlation_fields(&envelope);
        assert_eq!(channel_id, Some("C1"));
        assert_eq!(thread_id, Some("1730000000.1000"));
    }
}
