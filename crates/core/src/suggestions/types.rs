//! Types for member suggestions

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::topic::RelationshipKind;

/// One relationship row returned by the graph for a single topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMatch {
    pub user_id: String,
    /// Normalized topic key
    pub topic: String,
    pub relationship_kind: RelationshipKind,
    /// Higher is more relevant
    pub activity_score: f64,
    pub display_name: Option<String>,
}

impl TopicMatch {
    pub fn new(
        user_id: impl Into<String>,
        topic: impl Into<String>,
        relationship_kind: RelationshipKind,
        activity_score: f64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            topic: topic.into(),
            relationship_kind,
            activity_score,
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

/// A deduplicated member with the strongest relationship found across all
/// requested topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub user_id: String,
    pub display_name: Option<String>,
    pub best_kind: RelationshipKind,
    /// Maximum activity among matches at `best_kind`
    pub activity_score: f64,
    /// Matched topics, sorted and deduplicated
    pub topics: Vec<String>,
    /// Number of matches consolidated into this candidate
    pub relationship_count: usize,
}

impl RankedCandidate {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.user_id)
    }
}

/// A ranked candidate skipped because their cooldown was still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrickledCandidate {
    pub user_id: String,
    /// 1-based position in the ranked list
    pub original_rank: usize,
    /// Cooldown left at the instant of the walk
    pub remaining: Duration,
}

/// Output of the trickle-down selector. Nothing here has touched the
/// cooldown store yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub selected: Vec<RankedCandidate>,
    pub trickled: Vec<TrickledCandidate>,
    /// Length of the ranked list handed to the selector, whether or not the
    /// walk reached its end
    pub pool_size: usize,
}

impl Selection {
    pub fn user_ids(&self) -> Vec<String> {
        self.selected.iter().map(|candidate| candidate.user_id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Request for member suggestions
#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    /// Topics to look up, typically already expanded with synonyms
    pub topics: Vec<String>,
    /// Member to leave out, usually the author of the message
    pub exclude_user_id: Option<String>,
    /// Maximum number of members to return
    pub limit: usize,
    /// Candidate pool multiplier
    pub oversample_factor: usize,
    /// Cooldown committed for every selected member
    pub cooldown_duration: Duration,
}

impl SuggestionRequest {
    /// Create a new suggestion request with default limits
    pub fn new(topics: Vec<String>) -> Self {
        Self {
            topics,
            exclude_user_id: None,
            limit: super::DEFAULT_MAX_SUGGESTIONS,
            oversample_factor: super::DEFAULT_OVERSAMPLE_FACTOR,
            cooldown_duration: super::DEFAULT_COOLDOWN,
        }
    }

    /// Leave a member out of the candidate pool
    pub fn excluding(mut self, user_id: impl Into<String>) -> Self {
        self.exclude_user_id = Some(user_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_oversample_factor(mut self, oversample_factor: usize) -> Self {
        self.oversample_factor = oversample_factor;
        self
    }

    pub fn with_cooldown(mut self, cooldown_duration: Duration) -> Self {
        self.cooldown_duration = cooldown_duration;
        self
    }

    /// Number of candidates fetched per topic and walked by the selector
    pub fn pool_size(&self) -> usize {
        self.limit.saturating_mul(self.oversample_factor)
    }
}

/// Result of a completed suggestion. When `selected` is non-empty its members
/// are already in cooldown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestionOutcome {
    pub selected: Vec<RankedCandidate>,
    pub trickled: Vec<TrickledCandidate>,
    /// Unique candidates after ranking
    pub candidate_count: usize,
}

impl SuggestionOutcome {
    pub fn user_ids(&self) -> Vec<String> {
        self.selected.iter().map(|candidate| candidate.user_id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}
