//! Reply text that tags the selected members

use std::sync::Arc;

use tracing::{debug, warn};

use pesto_core::suggestions::RankedCandidate;

use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts::{reply_context, REPLY_PERSONALITY_PROMPT};

const REPLY_TEMPERATURE: f32 = 0.9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplySource {
    Model,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposedReply {
    pub text: String,
    pub source: ReplySource,
}

#[derive(Clone)]
pub struct ReplyComposer {
    llm: Arc<dyn LlmClient>,
    model: Option<String>,
}

impl ReplyComposer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, model: None }
    }

    /// Use a different model for replies than for classification.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// A model reply is only used when it is a single line mentioning every
    /// selected member.
    pub async fn compose(
        &self,
        original_message: &str,
        topics: &[String],
        members: &[RankedCandidate],
    ) -> ComposedReply {
        if members.is_empty() {
            return ComposedReply { text: String::new(), source: ReplySource::Fallback };
        }

        let lines: Vec<String> = members.iter().map(member_line).collect();
        let mut request = CompletionRequest::new(reply_context(original_message, topics, &lines))
            .with_system(REPLY_PERSONALITY_PROMPT)
            .with_temperature(REPLY_TEMPERATURE);
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }

        match self.llm.complete(request).await {
            Ok(raw) => match accept_model_reply(&raw, members) {
                Some(text) => {
                    debug!(
                        event_name = "agent.reply.composed",
                        members = members.len(),
                        "reply composed"
                    );
                    ComposedReply { text, source: ReplySource::Model }
                }
                None => {
                    warn!(
                        event_name = "agent.reply.rejected",
                        raw = %raw,
                        "model reply did not mention every member, using fallback"
                    );
                    fallback(members)
                }
            },
            Err(error) => {
                warn!(event_name = "agent.reply.failed", error = %error, "reply generation failed");
                fallback(members)
            }
        }
    }
}

pub fn mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

fn member_line(member: &RankedCandidate) -> String {
    format!(
        "{} ({} - {} {}: {})",
        mention(&member.user_id),
        member.label(),
        member.best_kind,
        member.topics.join(", "),
        member.best_kind.describe()
    )
}

fn accept_model_reply(raw: &str, members: &[RankedCandidate]) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
    let line = line.trim_matches('"').trim();
    members.iter().all(|member| line.contains(&mention(&member.user_id))).then(|| line.to_string())
}

pub fn fallback(members: &[RankedCandidate]) -> ComposedReply {
    let mentions: Vec<String> = members.iter().map(|member| mention(&member.user_id)).collect();
    ComposedReply {
        text: format!("{}, this one's for you!", mentions.join(" ")),
        source: ReplySource::Fallback,
    }
}
