use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use pesto_core::graph::GraphError;

pub mod memory;
pub mod topic_graph;

pub use memory::InMemoryTopicGraph;
pub use topic_graph::SqlTopicGraph;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for GraphError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => GraphError::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => GraphError::Decode(message),
        }
    }
}

/// Size of the topic graph, for health and doctor output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub members: u64,
    pub topics: u64,
    pub relationships: u64,
}

#[async_trait]
pub trait GraphStatsRepository: Send + Sync {
    async fn stats(&self) -> Result<GraphStats, RepositoryError>;
}
