//! Member suggestions for topic-driven tagging
//!
//! Ranks community members for a set of topics, skips members who were tagged
//! recently ("trickle-down" past the cooldown), and commits the final pick
//! into the shared cooldown store.

mod cooldown;
mod engine;
mod ranking;
mod selector;
mod types;

use std::time::Duration;

pub use cooldown::{
    Clock, CooldownGuard, CooldownStats, CooldownStore, ManualClock, SystemClock, UserCooldown,
};
pub use engine::SuggestionEngine;
pub use ranking::rank;
pub use selector::{select, select_guarded};
pub use types::*;

use thiserror::Error;

use crate::errors::{ApplicationError, DomainError, LookupFailure};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SuggestionError {
    #[error(transparent)]
    Lookup(#[from] LookupFailure),
    #[error("invalid suggestion request: {0}")]
    InvalidRequest(String),
}

impl From<SuggestionError> for ApplicationError {
    fn from(value: SuggestionError) -> Self {
        match value {
            SuggestionError::Lookup(failure) => Self::Lookup(failure),
            SuggestionError::InvalidRequest(message) => {
                Self::Domain(DomainError::InvalidSuggestionRequest(message))
            }
        }
    }
}

/// Result type for suggestion operations
pub type SuggestionResult<T> = Result<T, SuggestionError>;

/// Members tagged per message
pub const DEFAULT_MAX_SUGGESTIONS: usize = 3;

/// Candidate pool multiplier absorbing cooldown exclusions
pub const DEFAULT_OVERSAMPLE_FACTOR: usize = 3;

/// Per-member suppression window after being tagged
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3600);
