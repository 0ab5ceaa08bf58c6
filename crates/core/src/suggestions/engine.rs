//! Suggestion orchestration: fetch, rank, select, commit

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::cooldown::CooldownStore;
use super::ranking::rank;
use super::selector::select_guarded;
use super::types::{SuggestionOutcome, SuggestionRequest};
use super::{SuggestionError, SuggestionResult};
use crate::domain::topic::normalize_topic;
use crate::errors::LookupFailure;
use crate::graph::TopicGraph;

/// Picks members to tag for a set of topics.
///
/// Stateless across calls apart from the shared [`CooldownStore`], so one
/// engine can serve any number of concurrent messages.
#[derive(Clone)]
pub struct SuggestionEngine {
    graph: Arc<dyn TopicGraph>,
    cooldowns: Arc<CooldownStore>,
}

impl SuggestionEngine {
    pub fn new(graph: Arc<dyn TopicGraph>, cooldowns: Arc<CooldownStore>) -> Self {
        Self { graph, cooldowns }
    }

    pub fn cooldowns(&self) -> &Arc<CooldownStore> {
        &self.cooldowns
    }

    /// Returns up to `request.limit` members, best first.
    ///
    /// Selected members are put in cooldown before this returns. A lookup
    /// failure on any topic aborts the call with no cooldown change, as does
    /// dropping the future before it completes.
    pub async fn suggest(&self, request: SuggestionRequest) -> SuggestionResult<SuggestionOutcome> {
        if request.limit == 0 {
            return Err(SuggestionError::InvalidRequest("limit must be at least 1".to_string()));
        }
        if request.oversample_factor == 0 {
            return Err(SuggestionError::InvalidRequest(
                "oversample factor must be at least 1".to_string(),
            ));
        }

        let topics = distinct_topics(&request.topics);
        if topics.is_empty() {
            debug!(event_name = "suggestions.no_topics", "no topics to look up");
            return Ok(SuggestionOutcome::default());
        }

        let fetch_limit = request.pool_size();
        let mut matches = Vec::new();
        for topic in &topics {
            let found = self.graph.fetch_topic_matches(topic, fetch_limit).await.map_err(|error| {
                warn!(
                    event_name = "suggestions.lookup_failed",
                    topic = %topic,
                    error = %error,
                    "topic lookup failed, nothing committed"
                );
                LookupFailure::new(topic.clone(), error.to_string())
            })?;
            matches.extend(found);
        }

        if let Some(excluded) = request.exclude_user_id.as_deref() {
            matches.retain(|candidate| candidate.user_id != excluded);
        }

        let ranked = rank(&matches);
        // Select and commit under one guard so overlapping calls cannot both
        // pick the same member.
        let selection = {
            let mut guard = self.cooldowns.guard();
            let selection =
                select_guarded(&ranked, request.limit, request.oversample_factor, &guard);
            guard.mark_all(
                selection.selected.iter().map(|candidate| candidate.user_id.as_str()),
                request.cooldown_duration,
            );
            selection
        };

        if selection.is_empty() {
            info!(
                event_name = "suggestions.empty_selection",
                topics = topics.len(),
                candidates = ranked.len(),
                trickled = selection.trickled.len(),
                "no members available to tag"
            );
            return Ok(SuggestionOutcome {
                selected: Vec::new(),
                trickled: selection.trickled,
                candidate_count: ranked.len(),
            });
        }

        info!(
            event_name = "suggestions.committed",
            selected = ?selection.user_ids(),
            trickled = selection.trickled.len(),
            candidates = ranked.len(),
            cooldown_secs = request.cooldown_duration.as_secs(),
            "members selected and placed in cooldown"
        );

        Ok(SuggestionOutcome {
            selected: selection.selected,
            trickled: selection.trickled,
            candidate_count: ranked.len(),
        })
    }
}

impl std::fmt::Debug for SuggestionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionEngine").field("cooldowns", &self.cooldowns).finish()
    }
}

fn distinct_topics(topics: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    topics
        .iter()
        .map(|topic| normalize_topic(topic))
        .filter(|topic| !topic.is_empty())
        .filter(|topic| seen.insert(topic.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::SuggestionEngine;
    use crate::domain::member::CommunityMember;
    use crate::domain::topic::RelationshipKind::{Expert, InterestedIn, WorkingOn};
    use crate::domain::topic::TopicRelationship;
    use crate::graph::{GraphError, TopicGraph};
    use crate::suggestions::{CooldownStore, SuggestionError, SuggestionRequest, TopicMatch};

    const HOUR: Duration = Duration::from_secs(3600);

    #[derive(Default)]
    struct FakeGraph {
        by_topic: HashMap<String, Vec<TopicMatch>>,
        failing_topic: Option<String>,
        requested_limits: Mutex<Vec<usize>>,
    }

    impl FakeGraph {
        fn with_matches(matches: Vec<TopicMatch>) -> Self {
            let mut by_topic: HashMap<String, Vec<TopicMatch>> = HashMap::new();
            for candidate in matches {
                by_topic.entry(candidate.topic.clone()).or_default().push(candidate);
            }
            Self { by_topic, ..Self::default() }
        }

        fn failing_on(mut self, topic: &str) -> Self {
            self.failing_topic = Some(topic.to_string());
            self
        }
    }

    #[async_trait]
    impl TopicGraph for FakeGraph {
        async fn fetch_topic_matches(
            &self,
            topic: &str,
            limit: usize,
        ) -> Result<Vec<TopicMatch>, GraphError> {
            self.requested_limits.lock().expect("limits lock").push(limit);
            if self.failing_topic.as_deref() == Some(topic) {
                return Err(GraphError::Unavailable("connection reset".to_string()));
            }
            // Yield so concurrent callers interleave.
            tokio::task::yield_now().await;
            Ok(self
                .by_topic
                .get(topic)
                .map(|rows| rows.iter().take(limit).cloned().collect())
                .unwrap_or_default())
        }

        async fn record_relationships(
            &self,
            _member: &CommunityMember,
            _relationships: &[TopicRelationship],
            _observed_at: DateTime<Utc>,
        ) -> Result<(), GraphError> {
            Ok(())
        }
    }

    fn example_graph() -> FakeGraph {
        FakeGraph::with_matches(vec![
            TopicMatch::new("u1", "ai", Expert, 5.0),
            TopicMatch::new("u2", "ai", WorkingOn, 9.0),
            TopicMatch::new("u1", "ml", WorkingOn, 1.0),
        ])
    }

    fn engine(graph: FakeGraph) -> (SuggestionEngine, Arc<CooldownStore>) {
        let cooldowns = Arc::new(CooldownStore::new());
        (SuggestionEngine::new(Arc::new(graph), cooldowns.clone()), cooldowns)
    }

    fn request(topics: &[&str]) -> SuggestionRequest {
        SuggestionRequest::new(topics.iter().map(|topic| topic.to_string()).collect())
            .with_cooldown(HOUR)
    }

    #[tokio::test]
    async fn selects_and_commits_cooldowns() {
        let (engine, cooldowns) = engine(example_graph());

        let outcome = engine
            .suggest(request(&["AI", "ML"]).with_limit(2).with_oversample_factor(3))
            .await
            .expect("suggest");

        assert_eq!(outcome.user_ids(), vec!["u1", "u2"]);
        assert_eq!(outcome.candidate_count, 2);
        assert!(cooldowns.is_active("u1"));
        assert!(cooldowns.is_active("u2"));
        let remaining = cooldowns.remaining("u1").expect("u1 remaining");
        assert!(remaining <= HOUR && remaining > HOUR - Duration::from_secs(5));
    }

    #[tokio::test]
    async fn recently_tagged_member_trickles_down() {
        let (engine, cooldowns) = engine(example_graph());
        cooldowns.mark("u1", HOUR);

        let outcome = engine.suggest(request(&["ai", "ml"]).with_limit(1)).await.expect("suggest");

        assert_eq!(outcome.user_ids(), vec!["u2"]);
        assert_eq!(outcome.trickled.len(), 1);
        assert_eq!(outcome.trickled[0].user_id, "u1");
    }

    #[tokio::test]
    async fn empty_selection_leaves_store_unchanged() {
        let (engine, cooldowns) = engine(example_graph());
        cooldowns.mark_all(["u1", "u2"], Duration::from_secs(30));
        let before = cooldowns.snapshot();

        let outcome = engine.suggest(request(&["ai"]).with_limit(1)).await.expect("suggest");

        assert!(outcome.is_empty());
        assert_eq!(cooldowns.snapshot(), before);
    }

    #[tokio::test]
    async fn no_matches_is_an_empty_outcome() {
        let (engine, cooldowns) = engine(example_graph());

        let outcome = engine.suggest(request(&["quantum"])).await.expect("suggest");

        assert!(outcome.is_empty());
        assert_eq!(outcome.candidate_count, 0);
        assert!(cooldowns.is_empty());
    }

    #[tokio::test]
    async fn lookup_failure_commits_nothing() {
        let (engine, cooldowns) = engine(example_graph().failing_on("ml"));

        let error = engine.suggest(request(&["ai", "ml"])).await.expect_err("lookup must fail");

        match error {
            SuggestionError::Lookup(failure) => assert_eq!(failure.topic, "ml"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(cooldowns.is_empty());
    }

    #[tokio::test]
    async fn author_is_never_suggested() {
        let (engine, cooldowns) = engine(example_graph());

        let outcome =
            engine.suggest(request(&["ai"]).excluding("u1").with_limit(3)).await.expect("suggest");

        assert_eq!(outcome.user_ids(), vec!["u2"]);
        assert!(!cooldowns.is_active("u1"));
    }

    #[tokio::test]
    async fn fetches_oversampled_pool_once_per_distinct_topic() {
        let graph = Arc::new(example_graph());
        let engine = SuggestionEngine::new(graph.clone(), Arc::new(CooldownStore::new()));

        engine
            .suggest(request(&["AI", " ai ", "ML", ""]).with_limit(2).with_oversample_factor(4))
            .await
            .expect("suggest");

        assert_eq!(*graph.requested_limits.lock().expect("limits lock"), vec![8, 8]);
    }

    #[tokio::test]
    async fn rejects_zero_limit_and_zero_oversample() {
        let (engine, cooldowns) = engine(example_graph());

        let zero_limit = engine.suggest(request(&["ai"]).with_limit(0)).await;
        let zero_oversample = engine.suggest(request(&["ai"]).with_oversample_factor(0)).await;

        assert!(matches!(zero_limit, Err(SuggestionError::InvalidRequest(_))));
        assert!(matches!(zero_oversample, Err(SuggestionError::InvalidRequest(_))));
        assert!(cooldowns.is_empty());
    }

    #[tokio::test]
    async fn stronger_relationship_beats_busier_member() {
        let (engine, _cooldowns) = engine(FakeGraph::with_matches(vec![
            TopicMatch::new("chatty", "rust", InterestedIn, 400.0),
            TopicMatch::new("maintainer", "rust", Expert, 2.0),
        ]));

        let outcome = engine.suggest(request(&["rust"]).with_limit(1)).await.expect("suggest");

        assert_eq!(outcome.user_ids(), vec!["maintainer"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_suggestions_never_share_a_member() {
        let mut matches = vec![TopicMatch::new("expert", "ai", Expert, 50.0)];
        for member in 0..15 {
            matches.push(TopicMatch::new(format!("m{member:02}"), "ai", WorkingOn, 1.0));
        }
        let (engine, cooldowns) = engine(FakeGraph::with_matches(matches));
        let start = Arc::new(tokio::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let start = start.clone();
                tokio::spawn(async move {
                    start.wait().await;
                    engine
                        .suggest(request(&["ai"]).with_limit(1).with_oversample_factor(16))
                        .await
                        .expect("suggest")
                })
            })
            .collect();

        let mut selected = Vec::new();
        for handle in handles {
            selected.extend(handle.await.expect("task join").user_ids());
        }

        assert_eq!(selected.len(), 8);
        assert_eq!(selected.iter().filter(|user_id| *user_id == "expert").count(), 1);
        let distinct: std::collections::HashSet<_> = selected.iter().collect();
        assert_eq!(distinct.len(), 8);
        assert_eq!(cooldowns.len(), 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_suggestions_never_lose_a_commit() {
        let mut matches = Vec::new();
        for pool in 0..32 {
            for member in 0..5 {
                matches.push(TopicMatch::new(
                    format!("p{pool}-u{member}"),
                    format!("topic-{pool}"),
                    WorkingOn,
                    (5 - member) as f64,
                ));
            }
        }
        let (engine, cooldowns) = engine(FakeGraph::with_matches(matches));

        let handles: Vec<_> = (0..32)
            .map(|pool| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine
                        .suggest(request(&[&format!("topic-{pool}")]).with_limit(3))
                        .await
                        .expect("suggest")
                })
            })
            .collect();

        let mut selected = Vec::new();
        for handle in handles {
            let outcome = handle.await.expect("task join");
            assert_eq!(outcome.selected.len(), 3);
            selected.extend(outcome.user_ids());
        }

        assert_eq!(selected.len(), 96);
        for user_id in &selected {
            assert!(cooldowns.is_active(user_id), "{user_id} lost its cooldown");
        }
        assert_eq!(cooldowns.len(), 96);
    }
}
