use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde_json::json;
use thiserror::Error;
use tokio::{net::TcpStream, sync::Mutex, task::JoinSet};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::blocks::MessageTemplate;
use crate::events::{
    parse_socket_frame, EventContext, EventDispatcher, HandlerResult,
    SlackEnvelope, SlackEvent, SocketFrame,
};
use crate::web::SlackWebClient;

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

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed sessions tolerated before giving up
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
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
    /// `Ok(None)` means the stream closed cleanly and should not be reopened.
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(
        &self,
        envelope_id: &str,
        response: Option<&MessageTemplate>,
    ) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket Mode over a websocket opened with `apps.connections.open`.
pub struct SlackSocketTransport {
    web: SlackWebClient,
    sink: Mutex<Option<SplitSink<WsStream, WsMessage>>>,
    source: Mutex<Option<SplitStream<WsStream>>>,
}

impl SlackSocketTransport {
    pub fn new(web: SlackWebClient) -> Self {
        Self { web, sink: Mutex::new(None), source: Mutex::new(None) }
    }

    async fn open(&self) -> Result<(), TransportError> {
        let url = self
            .web
            .open_socket_url()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (sink, source) = stream.split();
        *self.sink.lock().await = Some(sink);
        *self.source.lock().await = Some(source);
        Ok(())
    }

    async fn next_text(&self) -> Result<String, TransportError> {
        let mut source = self.source.lock().await;
        let Some(stream) = source.as_mut() else {
            return Err(TransportError::Receive("socket is not connected".to_owned()));
        };

        loop {
            let Some(message) = stream.next().await else {
                return Err(TransportError::Receive("socket stream ended".to_owned()));
            };
            match message.map_err(|error| TransportError::Receive(error.to_string()))? {
                WsMessage::Text(text) => return Ok(text.as_str().to_owned()),
                WsMessage::Binary(bytes) => {
                    let text = std::str::from_utf8(&bytes)
                        .map_err(|error| TransportError::Receive(error.to_string()))?;
                    return Ok(text.to_owned());
                }
                WsMessage::Close(frame) => {
                    return Err(TransportError::Receive(format!("socket closed by peer: {frame:?}")))
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
    }
}

#[async_trait]
impl SocketTransport for SlackSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.open().await
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        loop {
            let text = self.next_text().await?;
            match parse_socket_frame(&text) {
                Ok(SocketFrame::Hello) => {
                    debug!(event_name = "ingress.slack.hello", "socket mode ready")
                }
                Ok(SocketFrame::Disconnect { reason }) => {
                    info!(
                        event_name = "ingress.slack.refresh",
                        reason = %reason,
                        "slack requested a socket refresh"
                    );
                    self.disconnect().await?;
                    self.open().await?;
                }
                Ok(SocketFrame::Envelope(envelope)) => return Ok(Some(envelope)),
                Err(error) => {
                    warn!(
                        event_name = "ingress.slack.unparseable_frame",
                        error = %error,
                        "skipping socket frame"
                    );
                }
            }
        }
    }

    async fn acknowledge(
        &self,
        envelope_id: &str,
        response: Option<&MessageTemplate>,
    ) -> Result<(), TransportError> {
        let mut ack = json!({ "envelope_id": envelope_id });
        if let Some(response) = response {
            ack["payload"] = serde_json::to_value(response)
                .map_err(|error| TransportError::Acknowledge(error.to_string()))?;
        }

        let mut sink = self.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            return Err(TransportError::Acknowledge("socket is not connected".to_owned()));
        };
        sink.send(WsMessage::Text(ack.to_string().into()))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.source.lock().await.take();
        if let Some(mut sink) = self.sink.lock().await.take() {
            sink.close().await.map_err(|error| TransportError::Disconnect(error.to_string()))?;
        }
        Ok(())
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_policy: ReconnectPolicy,
}

#[derive(Default)]
struct SessionReport {
    delivered: usize,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher: Arc::new(dispatcher), reconnect_policy }
    }

    /// Pumps envelopes until the transport closes cleanly or reconnects are
    /// exhausted. Never fails the process.
    pub async fn start(&self) -> Result<()> {
        let mut tasks = JoinSet::new();
        let mut failures = 0_u32;

        loop {
            let mut session = SessionReport::default();
            let outcome = self.connect_and_pump(&mut session, &mut tasks).await;
            let Err(transport_error) = outcome else {
                break;
            };

            // A session that delivered anything was healthy.
            if session.delivered > 0 {
                failures = 0;
            }
            warn!(
                event_name = "ingress.slack.transport_failed",
                failures,
                max_retries = self.reconnect_policy.max_retries,
                error = %transport_error,
                "socket mode transport failed"
            );

            if failures >= self.reconnect_policy.max_retries {
                warn!(
                    max_retries = self.reconnect_policy.max_retries,
                    "socket mode retries exhausted; continuing process without crash"
                );
                break;
            }

            let delay = self.reconnect_policy.backoff(failures);
            failures += 1;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    async fn connect_and_pump(
        &self,
        session: &mut SessionReport,
        tasks: &mut JoinSet<()>,
    ) -> Result<(), TransportError> {
        info!("opening socket mode transport connection");
        self.transport.connect().await?;
        info!("socket mode transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!("socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            session.delivered += 1;
            while tasks.try_join_next().is_some() {}

            let (channel_id, user_id) = correlation_fields(&envelope);
            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                channel_id = channel_id.unwrap_or("unknown"),
                user_id = user_id.unwrap_or("unknown"),
                "received slack envelope"
            );
            let context = EventContext { correlation_id: envelope.envelope_id.clone() };

            // Slash command responses ride on the ack, so those are handled
            // inline. Everything else is acked first and handled concurrently.
            if matches!(envelope.event, SlackEvent::SlashCommand(_)) {
                let response = match self.dispatcher.dispatch(&envelope, &context).await {
                    Ok(HandlerResult::Responded(message)) => Some(message),
                    Ok(_) => None,
                    Err(error) => {
                        warn!(
                            correlation_id = %envelope.envelope_id,
                            error = %error,
                            "slash command dispatch failed"
                        );
                        None
                    }
                };
                self.acknowledge(&envelope, response.as_ref()).await;
                continue;
            }

            self.acknowledge(&envelope, None).await;
            let dispatcher = Arc::clone(&self.dispatcher);
            tasks.spawn(async move {
                if let Err(error) = dispatcher.dispatch(&envelope, &context).await {
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %envelope.envelope_id,
                        error = %error,
                        "event dispatch failed; continuing socket loop"
                    );
                }
            });
        }
    }

    async fn acknowledge(&self, envelope: &SlackEnvelope, response: Option<&MessageTemplate>) {
        if let Err(error) = self.transport.acknowledge(&envelope.envelope_id, response).await {
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
                with_response = response.is_some(),
                "acknowledged slack envelope"
            );
        }
    }
}

fn correlation_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        SlackEvent::ChannelMessage(event) => {
            (Some(event.channel_id.as_str()), Some(event.user_id.as_str()))
        }
        SlackEvent::SlashCommand(payload) => {
            (Some(payload.channel_id.as_str()), Some(payload.user_id.as_str()))
        }
        SlackEvent::Unsupported { .. } => (None, None),
    }
}
