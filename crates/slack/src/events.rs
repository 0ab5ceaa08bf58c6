use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use pesto_core::errors::ApplicationError;

use crate::{
    blocks::{self, MessageTemplate},
    commands::{normalize_pesto_command, CommandRouter, CooldownReporter, SlashCommandPayload},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    ChannelMessage(ChannelMessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::ChannelMessage(_) => SlackEventType::ChannelMessage,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    ChannelMessage,
    Unsupported,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ChannelMessageEvent {
    #[serde(rename = "channel", default)]
    pub channel_id: String,
    #[serde(rename = "user", default)]
    pub user_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

impl ChannelMessageEvent {
    /// A top-level message typed by a person. Edits, joins, bot posts and
    /// thread replies are not.
    pub fn is_original(&self) -> bool {
        self.bot_id.is_none()
            && self.subtype.is_none()
            && !self.user_id.trim().is_empty()
            && !self.channel_id.trim().is_empty()
            && !self.text.trim().is_empty()
            && self.thread_ts.as_deref().map_or(true, |thread_ts| thread_ts == self.ts)
    }
}

/// One decoded websocket text frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    /// Slack is about to close this connection and wants a new one.
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventParseError {
    #[error("socket frame is not valid json: {0}")]
    InvalidJson(String),
    #[error("socket envelope `{0}` is missing envelope_id")]
    MissingEnvelopeId(String),
}

#[derive(Deserialize)]
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

#[derive(Deserialize)]
struct RawSlashCommand {
    #[serde(default)]
    command: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    trigger_id: String,
}

pub fn parse_socket_frame(raw: &str) -> Result<SocketFrame, EventParseError> {
    let frame: RawFrame =
        serde_json::from_str(raw).map_err(|error| EventParseError::InvalidJson(error.to_string()))?;

    match frame.frame_type.as_str() {
        "hello" => return Ok(SocketFrame::Hello),
        "disconnect" => {
            return Ok(SocketFrame::Disconnect {
                reason: frame.reason.unwrap_or_else(|| "unspecified".to_owned()),
            })
        }
        _ => {}
    }

    let envelope_id = frame
        .envelope_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| EventParseError::MissingEnvelopeId(frame.frame_type.clone()))?;
    let event = parse_event(&frame.frame_type, frame.payload);

    Ok(SocketFrame::Envelope(SlackEnvelope { envelope_id, event }))
}

fn parse_event(frame_type: &str, payload: Value) -> SlackEvent {
    match frame_type {
        "events_api" => {
            let inner = &payload["event"];
            let event_type = inner["type"].as_str().unwrap_or("unknown");
            if event_type != "message" {
                return SlackEvent::Unsupported { event_type: format!("events_api.{event_type}") };
            }
            match serde_json::from_value::<ChannelMessageEvent>(inner.clone()) {
                Ok(message) => SlackEvent::ChannelMessage(message),
                Err(_) => SlackEvent::Unsupported { event_type: "events_api.message".to_owned() },
            }
        }
        "slash_commands" => match serde_json::from_value::<RawSlashCommand>(payload) {
            Ok(raw) => SlackEvent::SlashCommand(SlashCommandPayload {
                command: raw.command,
                text: raw.text,
                channel_id: raw.channel_id,
                user_id: raw.user_id,
                trigger_id: raw.trigger_id,
            }),
            Err(_) => SlackEvent::Unsupported { event_type: "slash_commands".to_owned() },
        },
        other => SlackEvent::Unsupported { event_type: other.to_owned() },
    }
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
    /// Body to send back with the envelope acknowledgement
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("channel message handler failure: {0}")]
    ChannelMessage(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub struct SlashCommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: CooldownReporter,
{
    pub fn new(router: CommandRouter<S>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: CooldownReporter + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let message = match normalize_pesto_command(payload.clone()) {
            Ok(normalized) => self.router.route(&normalized),
            Err(error) => {
                warn!(
                    event_name = "slack.command.rejected",
                    correlation_id = %ctx.correlation_id,
                    user_id = %payload.user_id,
                    error = %error,
                    "slash command rejected"
                );
                let interface = ApplicationError::from(error).into_interface(&ctx.correlation_id);
                blocks::error_message(interface.user_message(), interface.correlation_id())
            }
        };
        Ok(HandlerResult::Responded(message))
    }
}

#[async_trait]
pub trait ChannelMessageService: Send + Sync {
    async fn handle_channel_message(
        &self,
        event: &ChannelMessageEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;
}

#[async_trait]
impl<T> ChannelMessageService for Arc<T>
where
    T: ChannelMessageService + ?Sized,
{
    async fn handle_channel_message(
        &self,
        event: &ChannelMessageEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        (**self).handle_channel_message(event, ctx).await
    }
}

pub struct ChannelMessageHandler<S> {
    service: S,
}

impl<S> ChannelMessageHandler<S>
where
    S: ChannelMessageService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ChannelMessageHandler<S>
where
    S: ChannelMessageService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ChannelMessage
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ChannelMessage(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if !event.is_original() {
            return Ok(HandlerResult::Ignored);
        }

        self.service.handle_channel_message(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}
