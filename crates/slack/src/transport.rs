use std::sync::Arc;

use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use secrecy::SecretString;
use serde_json::json;
use slackdify_core::errors::FailureKind;
use tokio::{
    net::TcpStream,
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::{
    events::{decode_frame, SlackEnvelope, SocketFrame},
    socket::{SocketTransport, TransportError},
    web::SlackWebClient,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type Inbound = mpsc::UnboundedReceiver<Result<SlackEnvelope, TransportError>>;

/// Socket Mode over a real WebSocket. `connect` spawns a reader task that owns
/// the read half and feeds decoded envelopes into a channel; acks go out
/// through the shared write half.
pub struct SocketModeTransport {
    web: SlackWebClient,
    app_token: SecretString,
    writer: Arc<Mutex<Option<WsSink>>>,
    inbound: Mutex<Option<Inbound>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SocketModeTransport {
    pub fn new(web: SlackWebClient, app_token: SecretString) -> Self {
        Self {
            web,
            app_token,
            writer: Arc::new(Mutex::new(None)),
            inbound: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    async fn teardown(&self) -> Result<(), TransportError> {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        self.inbound.lock().await.take();

        let Some(mut writer) = self.writer.lock().await.take() else {
            return Ok(());
        };
        writer.close().await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

#[async_trait]
impl SocketTransport for SocketModeTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if let Err(error) = self.teardown().await {
            debug!(error = %error, "previous socket did not close cleanly");
        }

        let url = self
            .web
            .open_connection(&self.app_token)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (stream, _response) =
            connect_async(url).await.map_err(|error| TransportError::Connect(error.to_string()))?;
        let (write, read) = stream.split();

        let (sender, receiver) = mpsc::unbounded_channel();
        *self.writer.lock().await = Some(write);
        *self.inbound.lock().await = Some(receiver);
        let reader = tokio::spawn(pump_frames(read, self.writer.clone(), sender));
        *self.reader.lock().await = Some(reader);

        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut inbound = self.inbound.lock().await;
        let Some(receiver) = inbound.as_mut() else {
            return Err(TransportError::Receive("socket is not connected".to_owned()));
        };

        match receiver.recv().await {
            Some(Ok(envelope)) => Ok(Some(envelope)),
            Some(Err(error)) => Err(error),
            None => Err(TransportError::Receive("socket reader stopped".to_owned())),
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        send_ack(&self.writer, envelope_id).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.teardown().await
    }
}

async fn send_ack(writer: &Mutex<Option<WsSink>>, envelope_id: &str) -> Result<(), TransportError> {
    let ack = json!({ "envelope_id": envelope_id }).to_string();
    let mut writer = writer.lock().await;
    let Some(writer) = writer.as_mut() else {
        return Err(TransportError::Acknowledge("socket is not connected".to_owned()));
    };
    writer
        .send(WsMessage::Text(ack.into()))
        .await
        .map_err(|error| TransportError::Acknowledge(error.to_string()))
}

async fn pump_frames(
    mut read: SplitStream<WsStream>,
    writer: Arc<Mutex<Option<WsSink>>>,
    sender: mpsc::UnboundedSender<Result<SlackEnvelope, TransportError>>,
) {
    let closed_reason = loop {
        let message = match read.next().await {
            Some(Ok(message)) => message,
            Some(Err(error)) => break format!("socket read failed: {error}"),
            None => break "socket stream ended".to_owned(),
        };

        match message {
            WsMessage::Text(text) => match decode_frame(text.as_str()) {
                Ok(SocketFrame::Hello) => info!("socket mode hello received"),
                Ok(SocketFrame::Disconnect { reason }) => {
                    info!(reason = %reason, "slack requested socket disconnect");
                    break format!("slack requested disconnect: {reason}");
                }
                Ok(SocketFrame::Envelope(envelope)) => {
                    if sender.send(Ok(envelope)).is_err() {
                        return;
                    }
                }
                Err(error) => {
                    warn!(
                        event_name = "ingress.slack.decode_failed",
                        failure_kind = FailureKind::EventDecode.as_str(),
                        envelope_id = error.envelope_id().unwrap_or("unknown"),
                        error = %error,
                        "dropping undecodable socket frame"
                    );
                    // Slack redelivers anything left unacked.
                    if let Some(envelope_id) = error.envelope_id() {
                        if let Err(error) = send_ack(&writer, envelope_id).await {
                            debug!(error = %error, "failed to ack undecodable envelope");
                        }
                    }
                }
            },
            WsMessage::Ping(data) => {
                if let Some(writer) = writer.lock().await.as_mut() {
                    if let Err(error) = writer.send(WsMessage::Pong(data)).await {
                        debug!(error = %error, "failed to answer socket ping");
                    }
                }
            }
            WsMessage::Close(_) => break "socket closed by slack".to_owned(),
            _ => {}
        }
    };

    let _ = sender.send(Err(TransportError::Receive(closed_reason)));
}
