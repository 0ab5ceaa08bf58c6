//! Bulk import of member interest profiles into the topic graph

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use pesto_core::config::{AppConfig, LoadOptions};
use pesto_core::{CommunityMember, GraphError, TopicGraph, TopicRelationship};
use pesto_db::{connect_with_config, migrations, SqlTopicGraph};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commands::{block_on, CommandResult};

/// One entry of the import file, e.g.
/// `{"user_id": "U1", "display_name": "Ada", "interests": ["AI|IS_EXPERT_IN"]}`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct InterestProfile {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub members: usize,
    pub relationships: usize,
    pub skipped_interests: usize,
    pub skipped_profiles: usize,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read import file: {0}")]
    Read(#[from] std::io::Error),
    #[error("import file is not a JSON array of profiles: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("graph write failed for member {user_id}: {source}")]
    Graph {
        user_id: String,
        #[source]
        source: GraphError,
    },
}

pub fn parse_profiles(raw: &str) -> Result<Vec<InterestProfile>, ImportError> {
    Ok(serde_json::from_str(raw)?)
}

/// Parses `Label|KIND` items, keeping the strongest kind per topic. Items
/// with an unknown kind or an empty label are counted as skipped.
pub fn profile_relationships(profile: &InterestProfile) -> (Vec<TopicRelationship>, usize) {
    let mut relationships: Vec<TopicRelationship> = Vec::new();
    let mut skipped = 0;

    for item in &profile.interests {
        let Ok(Some(relationship)) = TopicRelationship::parse(item) else {
            skipped += 1;
            continue;
        };

        let key = relationship.topic_key();
        match relationships.iter_mut().find(|existing| existing.topic_key() == key) {
            Some(existing) => existing.kind = existing.kind.max(relationship.kind),
            None => relationships.push(relationship),
        }
    }

    (relationships, skipped)
}

pub async fn import_profiles(
    graph: &dyn TopicGraph,
    profiles: &[InterestProfile],
    observed_at: DateTime<Utc>,
) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary::default();

    for profile in profiles {
        let user_id = profile.user_id.trim();
        if user_id.is_empty() {
            summary.skipped_profiles += 1;
            continue;
        }

        let (relationships, skipped) = profile_relationships(profile);
        summary.skipped_interests += skipped;
        if relationships.is_empty() {
            summary.skipped_profiles += 1;
            continue;
        }

        let mut member = CommunityMember::new(user_id);
        if let Some(name) = profile.display_name.as_deref().map(str::trim).filter(|n| !n.is_empty())
        {
            member = member.with_display_name(name);
        }

        graph
            .record_relationships(&member, &relationships, observed_at)
            .await
            .map_err(|source| ImportError::Graph { user_id: user_id.to_string(), source })?;
        summary.members += 1;
        summary.relationships += relationships.len();
    }

    Ok(summary)
}

pub fn run(path: &Path) -> CommandResult {
    let read = fs::read_to_string(path).map_err(ImportError::from);
    let profiles = match read.and_then(|raw| parse_profiles(&raw)) {
        Ok(profiles) => profiles,
        Err(error) => {
            return CommandResult::failure("import-interests", "input", error.to_string(), 2)
        }
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "import-interests",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let result = block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let graph = SqlTopicGraph::new(pool.clone());
        let summary = import_profiles(&graph, &profiles, Utc::now())
            .await
            .map_err(|error| ("graph_write", error.to_string(), 6u8));
        pool.close().await;
        summary
    });

    match result {
        Ok(Ok(summary)) => CommandResult::success(
            "import-interests",
            format!(
                "imported {} member(s) with {} relationship(s); skipped {} interest(s) and {} profile(s)",
                summary.members,
                summary.relationships,
                summary.skipped_interests,
                summary.skipped_profiles
            ),
        ),
        Ok(Err((error_class, message, exit_code))) => {
            CommandResult::failure("import-interests", error_class, message, exit_code)
        }
        Err(error) => CommandResult::failure(
            "import-interests",
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        ),
    }
}
