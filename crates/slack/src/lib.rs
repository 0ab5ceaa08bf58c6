//! Slack Integration - Socket Mode bot interface
//!
//! This crate provides the Slack interface for Pesto:
//! - **Socket Mode** (`socket`) - WebSocket connection to Slack (no public URL needed)
//! - **Events** (`events`) - Channel messages and slash command parsing and dispatch
//! - **Slash Commands** (`commands`) - `/pesto cooldowns`, `/pesto help` for admins
//! - **Web API** (`web`) - Thread replies and member display names
//! - **Block Kit** (`blocks`) - Message builders for command responses
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to `message.channels`
//! 3. Add the `/pesto` slash command
//! 4. Set env vars: `PESTO_SLACK_APP_TOKEN`, `PESTO_SLACK_BOT_TOKEN`
//!
//! # Architecture
//!
//! ```text
//! Slack Events → SocketModeRunner → EventDispatcher → Handlers → message pipeline
//!                      ↑                                              ↓
//!              ack (+ command response)              MessageGateway (thread reply)
//! ```

pub mod blocks;
pub mod commands;
pub mod events;
pub mod socket;
pub mod web;

pub use events::{ChannelMessageEvent, ChannelMessageService, EventDispatcher};
pub use socket::{ReconnectPolicy, SlackSocketTransport, SocketModeRunner};
pub use web::{MessageGateway, PostedMessage, SlackApiError, SlackWebClient};
