use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Normalized topic key: trimmed, lowercased, internal whitespace collapsed.
///
/// Two topic labels are the same topic iff their normalized keys are equal.
pub fn normalize_topic(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Strength of a member's association with a topic.
///
/// Variant order is priority order: `Expert` compares greatest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    InterestedIn,
    WorkingOn,
    Expert,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 3] =
        [RelationshipKind::Expert, RelationshipKind::WorkingOn, RelationshipKind::InterestedIn];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expert => "EXPERT",
            Self::WorkingOn => "WORKING_ON",
            Self::InterestedIn => "INTERESTED_IN",
        }
    }

    /// Lower is stronger. Matches the ordering used by the SQL graph queries.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Expert => 0,
            Self::WorkingOn => 1,
            Self::InterestedIn => 2,
        }
    }

    pub fn from_rank(rank: i64) -> Option<Self> {
        match rank {
            0 => Some(Self::Expert),
            1 => Some(Self::WorkingOn),
            2 => Some(Self::InterestedIn),
            _ => None,
        }
    }

    /// Short phrase used when describing a member to the reply generator.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Expert => "the go-to authority",
            Self::WorkingOn => "actively building/developing",
            Self::InterestedIn => "learning/curious about",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "EXPERT" | "IS_EXPERT_IN" | "EXPERT_IN" => Ok(Self::Expert),
            "WORKING_ON" | "IS_WORKING_ON" => Ok(Self::WorkingOn),
            "INTERESTED_IN" | "IS_INTERESTED_IN" | "MENTIONS" => Ok(Self::InterestedIn),
            _ => Err(DomainError::UnknownRelationshipKind(value.trim().to_owned())),
        }
    }
}

/// A topic together with how a member relates to it, e.g. `AI|IS_EXPERT_IN`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicRelationship {
    pub label: String,
    pub kind: RelationshipKind,
}

impl TopicRelationship {
    pub fn new(label: impl Into<String>, kind: RelationshipKind) -> Self {
        Self { label: label.into(), kind }
    }

    pub fn topic_key(&self) -> String {
        normalize_topic(&self.label)
    }

    /// Parses one `Label|KIND` item. A bare label is read as `INTERESTED_IN`,
    /// which is how plain topic mentions enter the graph.
    pub fn parse(item: &str) -> Result<Option<Self>, DomainError> {
        let mut parts = item.splitn(2, '|');
        let label = parts.next().unwrap_or_default().trim().trim_matches(['"', '\'', '.', '*']);
        if label.is_empty() {
            return Ok(None);
        }

        let kind = match parts.next().map(str::trim).filter(|kind| !kind.is_empty()) {
            Some(kind) => kind.parse()?,
            None => RelationshipKind::InterestedIn,
        };

        Ok(Some(Self::new(label.split_whitespace().collect::<Vec<_>>().join(" "), kind)))
    }
}

/// Parses a comma/newline separated list of `Label|KIND` items.
///
/// Items with an unrecognised kind are skipped. When a topic appears more
/// than once the strongest kind wins and the first spelling is kept.
pub fn parse_topic_relationships(raw: &str, max_items: usize) -> Vec<TopicRelationship> {
    let mut parsed: Vec<TopicRelationship> = Vec::new();

    for item in raw.split([',', '\n']) {
        let Ok(Some(relationship)) = TopicRelationship::parse(item) else {
            continue;
        };

        let key = relationship.topic_key();
        if let Some(existing) = parsed.iter_mut().find(|existing| existing.topic_key() == key) {
            existing.kind = existing.kind.max(relationship.kind);
            continue;
        }

        if parsed.len() < max_items {
            parsed.push(relationship);
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::{normalize_topic, parse_topic_relationships, RelationshipKind, TopicRelationship};

    #[test]
    fn normalization_is_case_and_whitespace_insensitive() {
        assert_eq!(normalize_topic("  Machine   Learning "), "machine learning");
        assert_eq!(normalize_topic("AI"), normalize_topic("ai"));
    }

    #[test]
    fn expert_outranks_other_kinds() {
        assert!(RelationshipKind::Expert > RelationshipKind::WorkingOn);
        assert!(RelationshipKind::WorkingOn > RelationshipKind::InterestedIn);
        assert!(RelationshipKind::Expert.rank() < RelationshipKind::InterestedIn.rank());
    }

    #[test]
    fn kind_parses_graph_and_prompt_spellings() {
        assert_eq!("IS_EXPERT_IN".parse::<RelationshipKind>(), Ok(RelationshipKind::Expert));
        assert_eq!("expert".parse::<RelationshipKind>(), Ok(RelationshipKind::Expert));
        assert_eq!("working on".parse::<RelationshipKind>(), Ok(RelationshipKind::WorkingOn));
        assert_eq!(
            "INTERESTED_IN".parse::<RelationshipKind>(),
            Ok(RelationshipKind::InterestedIn)
        );
        assert!("FAN_OF".parse::<RelationshipKind>().is_err());
    }

    #[test]
    fn kind_round_trips_through_rank() {
        for kind in RelationshipKind::ALL {
            assert_eq!(RelationshipKind::from_rank(i64::from(kind.rank())), Some(kind));
        }
        assert_eq!(RelationshipKind::from_rank(7), None);
    }

    #[test]
    fn bare_label_defaults_to_interested_in() {
        let parsed = TopicRelationship::parse(" Robotics ").expect("parse");
        let expected = TopicRelationship::new("Robotics", RelationshipKind::InterestedIn);
        assert_eq!(parsed, Some(expected));
    }

    #[test]
    fn list_parsing_dedups_and_keeps_strongest_kind() {
        let parsed = parse_topic_relationships(
            "Computer Vision|WORKING_ON, machine learning|INTERESTED_IN,\nMachine Learning|IS_EXPERT_IN, Sports|FAN_OF",
            5,
        );

        assert_eq!(
            parsed,
            vec![
                TopicRelationship::new("Computer Vision", RelationshipKind::WorkingOn),
                TopicRelationship::new("machine learning", RelationshipKind::Expert),
            ]
        );
    }

    #[test]
    fn list_parsing_caps_item_count() {
        let parsed = parse_topic_relationships("a, b, c, d, e, f, g", 5);
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[4].label, "e");
    }
}
