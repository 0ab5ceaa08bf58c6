use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use pesto_core::domain::member::CommunityMember;
use pesto_core::domain::topic::{RelationshipKind, TopicRelationship};
use pesto_core::graph::{GraphError, TopicGraph};
use pesto_core::suggestions::TopicMatch;

use super::{GraphStats, GraphStatsRepository, RepositoryError};

#[derive(Clone, Debug)]
struct EdgeRecord {
    mention_count: u64,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

#[derive(Default)]
struct GraphState {
    display_names: HashMap<String, Option<String>>,
    edges: HashMap<(String, String, RelationshipKind), EdgeRecord>,
}

/// Process-local topic graph with the same semantics as [`super::SqlTopicGraph`].
#[derive(Default)]
pub struct InMemoryTopicGraph {
    state: RwLock<GraphState>,
}

impl InMemoryTopicGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// When `(member, topic, kind)` was first and last observed.
    pub async fn observed_window(
        &self,
        user_id: &str,
        topic: &str,
        kind: RelationshipKind,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let state = self.state.read().await;
        state
            .edges
            .get(&(user_id.to_string(), topic.to_string(), kind))
            .map(|edge| (edge.first_seen_at, edge.last_seen_at))
    }
}

#[async_trait]
impl TopicGraph for InMemoryTopicGraph {
    async fn fetch_topic_matches(
        &self,
        topic: &str,
        limit: usize,
    ) -> Result<Vec<TopicMatch>, GraphError> {
        let state = self.state.read().await;

        let mut per_user: HashMap<&str, (RelationshipKind, u64)> = HashMap::new();
        for ((user_id, edge_topic, kind), edge) in &state.edges {
            if edge_topic != topic {
                continue;
            }
            let entry = per_user.entry(user_id.as_str()).or_insert((*kind, 0));
            entry.0 = entry.0.max(*kind);
            entry.1 += edge.mention_count;
        }

        let mut matches: Vec<TopicMatch> = per_user
            .into_iter()
            .map(|(user_id, (kind, activity))| {
                let mut candidate = TopicMatch::new(user_id, topic, kind, activity as f64);
                candidate.display_name = state.display_names.get(user_id).cloned().flatten();
                candidate
            })
            .collect();

        matches.sort_by(|a, b| {
            b.relationship_kind
                .cmp(&a.relationship_kind)
                .then_with(|| b.activity_score.total_cmp(&a.activity_score))
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn record_relationships(
        &self,
        member: &CommunityMember,
        relationships: &[TopicRelationship],
        observed_at: DateTime<Utc>,
    ) -> Result<(), GraphError> {
        let mut state = self.state.write().await;

        let display_name = state.display_names.entry(member.user_id.clone()).or_default();
        if member.display_name.is_some() {
            display_name.clone_from(&member.display_name);
        }

        for relationship in relationships {
            let topic = relationship.topic_key();
            if topic.is_empty() {
                continue;
            }
            state
                .edges
                .entry((member.user_id.clone(), topic, relationship.kind))
                .and_modify(|edge| {
                    edge.mention_count += 1;
                    edge.last_seen_at = observed_at;
                })
                .or_insert(EdgeRecord {
                    mention_count: 1,
                    first_seen_at: observed_at,
                    last_seen_at: observed_at,
                });
        }

        Ok(())
    }
}

#[async_trait]
impl GraphStatsRepository for InMemoryTopicGraph {
    async fn stats(&self) -> Result<GraphStats, RepositoryError> {
        let state = self.state.read().await;
        let topics: HashSet<&str> =
            state.edges.keys().map(|(_, topic, _)| topic.as_str()).collect();
        Ok(GraphStats {
            members: state.display_names.len() as u64,
            topics: topics.len() as u64,
            relationships: state.edges.len() as u64,
        })
    }
}
