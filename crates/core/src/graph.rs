//! Contract for the user↔topic relationship graph.
//!
//! The suggestion core only reads from the graph; the message pipeline and the
//! interest importer write to it. Implementations live in `pesto-db`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::member::CommunityMember;
use crate::domain::topic::TopicRelationship;
use crate::suggestions::TopicMatch;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph store unavailable: {0}")]
    Unavailable(String),
    #[error("graph record could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait TopicGraph: Send + Sync {
    /// Members related to `topic` (normalized equality), strongest first,
    /// at most `limit` rows, at most one row per member.
    async fn fetch_topic_matches(
        &self,
        topic: &str,
        limit: usize,
    ) -> Result<Vec<TopicMatch>, GraphError>;

    /// MERGE-style upsert: refreshes the member's display name and bumps the
    /// mention count of every `(member, topic, kind)` relationship.
    async fn record_relationships(
        &self,
        member: &CommunityMember,
        relationships: &[TopicRelationship],
        observed_at: DateTime<Utc>,
    ) -> Result<(), GraphError>;
}
