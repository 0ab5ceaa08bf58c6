use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::debug;

use pesto_core::domain::member::CommunityMember;
use pesto_core::domain::topic::{RelationshipKind, TopicRelationship};
use pesto_core::graph::{GraphError, TopicGraph};
use pesto_core::suggestions::TopicMatch;

use super::{GraphStats, GraphStatsRepository, RepositoryError};
use crate::DbPool;

/// Topic graph stored in SQLite.
///
/// One `user_topic` row per `(member, topic, kind)`; every observation bumps
/// its `mention_count`, which doubles as the activity score.
pub struct SqlTopicGraph {
    pool: DbPool,
}

impl SqlTopicGraph {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, topic: &str, limit: usize) -> Result<Vec<TopicMatch>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT ut.user_id AS user_id,
                    cu.display_name AS display_name,
                    MIN(CASE ut.relationship_kind
                        WHEN 'EXPERT' THEN 0
                        WHEN 'WORKING_ON' THEN 1
                        ELSE 2 END) AS kind_rank,
                    SUM(ut.mention_count) AS activity
             FROM user_topic ut
             JOIN community_user cu ON cu.id = ut.user_id
             WHERE ut.topic = ?
             GROUP BY ut.user_id, cu.display_name
             ORDER BY kind_rank ASC, activity DESC, ut.user_id ASC
             LIMIT ?",
        )
        .bind(topic)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| row_to_match(row, topic)).collect()
    }

    async fn record(
        &self,
        member: &CommunityMember,
        relationships: &[TopicRelationship],
        observed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let observed_at = observed_at.to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO community_user (id, display_name, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                display_name = COALESCE(excluded.display_name, community_user.display_name),
                updated_at = excluded.updated_at",
        )
        .bind(&member.user_id)
        .bind(&member.display_name)
        .bind(&observed_at)
        .bind(&observed_at)
        .execute(&mut *tx)
        .await?;

        for relationship in relationships {
            let topic = relationship.topic_key();
            if topic.is_empty() {
                continue;
            }

            sqlx::query(
                "INSERT INTO user_topic
                    (user_id, topic, topic_label, relationship_kind, mention_count, first_seen_at, last_seen_at)
                 VALUES (?, ?, ?, ?, 1, ?, ?)
                 ON CONFLICT(user_id, topic, relationship_kind) DO UPDATE SET
                    mention_count = user_topic.mention_count + 1,
                    topic_label = excluded.topic_label,
                    last_seen_at = excluded.last_seen_at",
            )
            .bind(&member.user_id)
            .bind(&topic)
            .bind(relationship.label.trim())
            .bind(relationship.kind.as_str())
            .bind(&observed_at)
            .bind(&observed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            event_name = "graph.relationships_recorded",
            user_id = %member.user_id,
            relationships = relationships.len(),
            "topic relationships recorded"
        );
        Ok(())
    }
}

fn row_to_match(row: &sqlx::sqlite::SqliteRow, topic: &str) -> Result<TopicMatch, RepositoryError> {
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let display_name: Option<String> =
        row.try_get("display_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind_rank: i64 =
        row.try_get("kind_rank").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let activity: i64 =
        row.try_get("activity").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let relationship_kind = RelationshipKind::from_rank(kind_rank).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown relationship rank `{kind_rank}` for `{user_id}`"))
    })?;

    let mut candidate = TopicMatch::new(user_id, topic, relationship_kind, activity as f64);
    candidate.display_name = display_name.filter(|name| !name.trim().is_empty());
    Ok(candidate)
}

#[async_trait]
impl TopicGraph for SqlTopicGraph {
    async fn fetch_topic_matches(
        &self,
        topic: &str,
        limit: usize,
    ) -> Result<Vec<TopicMatch>, GraphError> {
        Ok(self.fetch(topic, limit).await?)
    }

    async fn record_relationships(
        &self,
        member: &CommunityMember,
        relationships: &[TopicRelationship],
        observed_at: DateTime<Utc>,
    ) -> Result<(), GraphError> {
        Ok(self.record(member, relationships, observed_at).await?)
    }
}

#[async_trait]
impl GraphStatsRepository for SqlTopicGraph {
    async fn stats(&self) -> Result<GraphStats, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM community_user) AS members,
                (SELECT COUNT(DISTINCT topic) FROM user_topic) AS topics,
                (SELECT COUNT(*) FROM user_topic) AS relationships",
        )
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> Result<u64, RepositoryError> {
            let value: i64 =
                row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))?;
            Ok(value.max(0) as u64)
        };

        Ok(GraphStats {
            members: count("members")?,
            topics: count("topics")?,
            relationships: count("relationships")?,
        })
    }
}
