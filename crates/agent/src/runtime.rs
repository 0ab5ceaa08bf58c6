use std::sync::Arc;

use pesto_core::config::{LlmConfig, TaggingConfig};

use crate::guardrails::{TaggingGuardrail, TaggingPolicy};
use crate::llm::{LlmClient, LlmError, OpenAiChatClient};
use crate::reply::ReplyComposer;
use crate::topics::{TopicExpander, TopicExtractor};

/// Every model-backed step of the message pipeline, sharing one client.
#[derive(Clone)]
pub struct AgentRuntime {
    pub extractor: TopicExtractor,
    pub expander: TopicExpander,
    pub guardrail: TaggingGuardrail,
    pub composer: ReplyComposer,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tagging: &TaggingConfig,
        reply_model: Option<String>,
    ) -> Self {
        let policy = TaggingPolicy { max_topics: tagging.max_topics, ..TaggingPolicy::default() };
        let mut composer = ReplyComposer::new(llm.clone());
        if let Some(model) = reply_model {
            composer = composer.with_model(model);
        }

        Self {
            extractor: TopicExtractor::new(llm.clone()),
            expander: TopicExpander::new(llm.clone()),
            guardrail: TaggingGuardrail::new(llm, policy),
            composer,
        }
    }

    pub fn from_config(llm: &LlmConfig, tagging: &TaggingConfig) -> Result<Self, LlmError> {
        let client = OpenAiChatClient::from_config(llm)?;
        let reply_model = Some(llm.effective_reply_model().to_string())
            .filter(|model| model != &llm.model);
        Ok(Self::new(Arc::new(client), tagging, reply_model))
    }
}
