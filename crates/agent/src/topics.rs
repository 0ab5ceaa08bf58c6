//! Topic extraction from messages and synonym expansion for matching

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use pesto_core::domain::topic::{normalize_topic, parse_topic_relationships, TopicRelationship};

use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts::{topic_expansion_prompt, TOPIC_EXTRACTION_SYSTEM_PROMPT};

pub const MAX_TOPICS_PER_MESSAGE: usize = 5;

/// Turns a chat message into `(topic, relationship)` pairs.
#[derive(Clone)]
pub struct TopicExtractor {
    llm: Arc<dyn LlmClient>,
    max_topics: usize,
}

impl TopicExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, max_topics: MAX_TOPICS_PER_MESSAGE }
    }

    pub fn with_max_topics(mut self, max_topics: usize) -> Self {
        self.max_topics = max_topics.max(1);
        self
    }

    /// Returns an empty list when the model fails; a message without topics
    /// simply does not update the graph.
    pub async fn extract(&self, text: &str) -> Vec<TopicRelationship> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let request =
            CompletionRequest::new(text.trim()).with_system(TOPIC_EXTRACTION_SYSTEM_PROMPT);
        match self.llm.complete(request).await {
            Ok(raw) => {
                let relationships = parse_topic_relationships(&raw, self.max_topics);
                debug!(
                    event_name = "agent.topics.extracted",
                    count = relationships.len(),
                    "topics extracted from message"
                );
                relationships
            }
            Err(error) => {
                warn!(
                    event_name = "agent.topics.extraction_failed",
                    error = %error,
                    "topic extraction failed"
                );
                Vec::new()
            }
        }
    }
}

/// Widens canonical topics with common synonyms so graph lookups also hit
/// members who used a different spelling.
#[derive(Clone)]
pub struct TopicExpander {
    llm: Arc<dyn LlmClient>,
}

impl TopicExpander {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Never fails: on a model error the canonical topics are returned as-is.
    pub async fn expand(&self, canonical: &[String]) -> Vec<String> {
        if canonical.is_empty() {
            return Vec::new();
        }

        let request = CompletionRequest::new(topic_expansion_prompt(canonical));
        match self.llm.complete(request).await {
            Ok(raw) => {
                let expanded = parse_expansion(&raw, canonical);
                debug!(
                    event_name = "agent.topics.expanded",
                    canonical = canonical.len(),
                    expanded = expanded.len(),
                    "topics expanded for matching"
                );
                expanded
            }
            Err(error) => {
                warn!(
                    event_name = "agent.topics.expansion_failed",
                    error = %error,
                    "topic expansion failed, using canonical topics"
                );
                dedup_topics(canonical.iter().map(String::as_str))
            }
        }
    }
}

/// Parses `a, b | c, d` output. Canonical topics always come first.
pub fn parse_expansion(raw: &str, canonical: &[String]) -> Vec<String> {
    let generated = raw
        .split('|')
        .flat_map(|group| group.split([',', '\n']))
        .map(|term| term.trim().trim_matches(['"', '\'', '.', '*', '-']).trim());

    dedup_topics(canonical.iter().map(String::as_str).chain(generated))
}

fn dedup_topics<'a>(terms: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .filter(|term| seen.insert(normalize_topic(term)))
        .map(str::to_string)
        .collect()
}
