use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts::tagging_decision_prompt;

const FALLBACK_KEYWORDS: &[&str] = &[
    "ai",
    "ml",
    "machine learning",
    "artificial intelligence",
    "data",
    "software",
    "programming",
    "robotics",
    "research",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionSource {
    Policy,
    Model,
    Heuristic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaggingDecision {
    Tag { source: DecisionSource },
    Skip { reason_code: &'static str, source: DecisionSource },
}

impl TaggingDecision {
    pub fn should_tag(&self) -> bool {
        matches!(self, Self::Tag { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggingPolicy {
    /// More topics than this reads as a broad discussion
    pub max_topics: usize,
    /// Topic ceiling when the model is unavailable
    pub fallback_max_topics: usize,
}

impl Default for TaggingPolicy {
    fn default() -> Self {
        Self { max_topics: 8, fallback_max_topics: 3 }
    }
}

impl TaggingPolicy {
    /// Cheap checks that settle the decision without asking the model.
    pub fn precheck(&self, topics: &[String]) -> Option<TaggingDecision> {
        if topics.is_empty() {
            return Some(TaggingDecision::Skip {
                reason_code: "no_topics",
                source: DecisionSource::Policy,
            });
        }
        if topics.len() > self.max_topics {
            return Some(TaggingDecision::Skip {
                reason_code: "too_many_topics",
                source: DecisionSource::Policy,
            });
        }
        None
    }

    /// Conservative keyword rule: only clearly technical, narrow messages.
    pub fn heuristic(&self, topics: &[String]) -> TaggingDecision {
        let has_tech = topics.iter().any(|topic| {
            let topic = topic.to_lowercase();
            FALLBACK_KEYWORDS.iter().any(|keyword| topic.contains(keyword))
        });

        if !has_tech {
            TaggingDecision::Skip {
                reason_code: "not_technical",
                source: DecisionSource::Heuristic,
            }
        } else if topics.len() > self.fallback_max_topics {
            TaggingDecision::Skip { reason_code: "too_broad", source: DecisionSource::Heuristic }
        } else {
            TaggingDecision::Tag { source: DecisionSource::Heuristic }
        }
    }
}

/// Decides whether a message is worth tagging members for.
#[derive(Clone)]
pub struct TaggingGuardrail {
    llm: Arc<dyn LlmClient>,
    policy: TaggingPolicy,
}

impl TaggingGuardrail {
    pub fn new(llm: Arc<dyn LlmClient>, policy: TaggingPolicy) -> Self {
        Self { llm, policy }
    }

    pub fn policy(&self) -> &TaggingPolicy {
        &self.policy
    }

    pub async fn decide(&self, channel_id: &str, topics: &[String]) -> TaggingDecision {
        if let Some(decision) = self.policy.precheck(topics) {
            return decision;
        }

        let request = CompletionRequest::new(tagging_decision_prompt(channel_id, topics));
        match self.llm.complete(request).await {
            Ok(raw) => {
                let decision = if parse_yes_no(&raw) {
                    TaggingDecision::Tag { source: DecisionSource::Model }
                } else {
                    TaggingDecision::Skip {
                        reason_code: "model_declined",
                        source: DecisionSource::Model,
                    }
                };
                debug!(
                    event_name = "agent.tagging.decided",
                    channel_id,
                    raw = %raw,
                    should_tag = decision.should_tag(),
                    "tagging decision made"
                );
                decision
            }
            Err(error) => {
                let decision = self.policy.heuristic(topics);
                warn!(
                    event_name = "agent.tagging.decision_fallback",
                    channel_id,
                    error = %error,
                    should_tag = decision.should_tag(),
                    "tagging decision fell back to keyword heuristic"
                );
                decision
            }
        }
    }
}

/// Only an explicit YES counts.
pub fn parse_yes_no(raw: &str) -> bool {
    raw.trim().trim_matches(|c: char| !c.is_alphanumeric()).eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{parse_yes_no, DecisionSource, TaggingDecision, TaggingGuardrail, TaggingPolicy};
    use crate::testing::ScriptedLlm;

    fn topics(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[tokio::test]
    async fn no_topics_skips_without_asking_the_model() {
        let llm = Arc::new(ScriptedLlm::replying(&["YES"]));
        let guardrail = TaggingGuardrail::new(llm.clone(), TaggingPolicy::default());

        let decision = guardrail.decide("C1", &[]).await;

        assert_eq!(
            decision,
            TaggingDecision::Skip { reason_code: "no_topics", source: DecisionSource::Policy }
        );
        assert_eq!(llm.request_count(), 0);
    }

    #[tokio::test]
    async fn broad_discussions_are_skipped() {
        let llm = Arc::new(ScriptedLlm::replying(&["YES"]));
        let guardrail = TaggingGuardrail::new(llm.clone(), TaggingPolicy::default());
        let many: Vec<String> = (0..9).map(|i| format!("topic {i}")).collect();

        let decision = guardrail.decide("C1", &many).await;

        assert!(!decision.should_tag());
        assert_eq!(llm.request_count(), 0);
    }

    #[tokio::test]
    async fn model_answer_drives_the_decision() {
        let llm = Arc::new(ScriptedLlm::replying(&["YES", "NO"]));
        let guardrail = TaggingGuardrail::new(llm, TaggingPolicy::default());

        assert_eq!(
            guardrail.decide("C1", &topics(&["AI", "Medical"])).await,
            TaggingDecision::Tag { source: DecisionSource::Model }
        );
        assert!(!guardrail.decide("C1", &topics(&["Coffee"])).await.should_tag());
    }

    #[tokio::test]
    async fn model_failure_uses_keyword_heuristic() {
        let guardrail =
            TaggingGuardrail::new(Arc::new(ScriptedLlm::failing()), TaggingPolicy::default());

        let decision = guardrail.decide("C1", &topics(&["Machine Learning", "Startups"])).await;

        assert_eq!(decision, TaggingDecision::Tag { source: DecisionSource::Heuristic });
    }

    #[test]
    fn heuristic_rejects_off_topic_and_broad_messages() {
        let policy = TaggingPolicy::default();

        assert!(!policy.heuristic(&topics(&["Weather", "Sports"])).should_tag());
        assert!(!policy.heuristic(&topics(&["AI", "Food", "Lunch", "Travel"])).should_tag());
        assert!(policy.heuristic(&topics(&["Data Pipelines"])).should_tag());
    }

    #[test]
    fn yes_no_parsing_is_strict() {
        assert!(parse_yes_no("YES"));
        assert!(parse_yes_no(" yes.\n"));
        assert!(!parse_yes_no("NO"));
        assert!(!parse_yes_no("Yes, definitely"));
        assert!(!parse_yes_no(""));
    }
}
