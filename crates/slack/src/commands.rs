use std::sync::Arc;

use thiserror::Error;

use pesto_core::errors::{ApplicationError, DomainError};
use pesto_core::suggestions::{CooldownStats, CooldownStore};

use crate::blocks::{self, MessageTemplate};

pub const PESTO_COMMAND: &str = "/pesto";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub verb: String,
    pub freeform_args: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PestoCommand {
    Cooldowns,
    Help,
    Unknown { verb: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
}

impl From<CommandParseError> for ApplicationError {
    fn from(value: CommandParseError) -> Self {
        match value {
            CommandParseError::UnsupportedCommand(command) => {
                Self::Domain(DomainError::UnsupportedCommand(command))
            }
        }
    }
}

pub fn normalize_pesto_command(
    payload: SlashCommandPayload,
) -> Result<CommandEnvelope, CommandParseError> {
    if payload.command != PESTO_COMMAND {
        return Err(CommandParseError::UnsupportedCommand(payload.command));
    }

    let text = payload.text.trim().to_owned();
    let mut parts = text.split_whitespace();
    let verb = parts.next().unwrap_or("help").to_ascii_lowercase();
    let freeform_args = parts.collect::<Vec<_>>().join(" ");

    Ok(CommandEnvelope {
        verb,
        freeform_args,
        channel_id: payload.channel_id,
        user_id: payload.user_id,
        trigger_id: payload.trigger_id,
    })
}

pub fn parse_pesto_command(verb: &str) -> PestoCommand {
    match verb {
        "cooldowns" | "cooldown" | "stats" => PestoCommand::Cooldowns,
        "" | "help" => PestoCommand::Help,
        other => PestoCommand::Unknown { verb: other.to_owned() },
    }
}

/// Read side of the cooldown store exposed to admins.
pub trait CooldownReporter: Send + Sync {
    fn cooldown_stats(&self) -> CooldownStats;
}

impl CooldownReporter for CooldownStore {
    fn cooldown_stats(&self) -> CooldownStats {
        self.stats()
    }
}

impl<T> CooldownReporter for Arc<T>
where
    T: CooldownReporter + ?Sized,
{
    fn cooldown_stats(&self) -> CooldownStats {
        (**self).cooldown_stats()
    }
}

pub struct CommandRouter<S> {
    reporter: S,
    admin_user_ids: Vec<String>,
}

impl<S> CommandRouter<S>
where
    S: CooldownReporter,
{
    pub fn new(reporter: S, admin_user_ids: Vec<String>) -> Self {
        Self { reporter, admin_user_ids }
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_user_ids.iter().any(|admin| admin == user_id)
    }

    /// Every verb is admin-only, including help.
    pub fn route(&self, envelope: &CommandEnvelope) -> MessageTemplate {
        if !self.is_admin(&envelope.user_id) {
            return blocks::error_message(
                "Access denied. Only Pesto admins can use this command.",
                &envelope.trigger_id,
            );
        }

        match parse_pesto_command(&envelope.verb) {
            PestoCommand::Cooldowns => {
                blocks::cooldown_report_message(&self.reporter.cooldown_stats())
            }
            PestoCommand::Help => blocks::help_message(),
            PestoCommand::Unknown { verb } => blocks::error_message(
                &format!("Unsupported command `/pesto {verb}`. Try `/pesto help`."),
                &envelope.trigger_id,
            ),
        }
    }
}
