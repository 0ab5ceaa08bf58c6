//! Per-message flow from a channel message to a tagging reply

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use pesto_agent::{reply::ReplySource, AgentRuntime, TaggingDecision};
use pesto_core::config::TaggingConfig;
use pesto_core::domain::member::CommunityMember;
use pesto_core::graph::TopicGraph;
use pesto_core::suggestions::{SuggestionEngine, SuggestionRequest};
use pesto_slack::events::{
    ChannelMessageEvent, ChannelMessageService, EventContext, EventHandlerError,
};
use pesto_slack::web::MessageGateway;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    NoTopics,
    Skipped { reason_code: &'static str },
    LookupFailed,
    NoCandidates,
    DeliveryFailed { user_ids: Vec<String> },
    Replied { user_ids: Vec<String>, source: ReplySource },
}

#[derive(Clone, Copy, Debug)]
pub struct SuggestionSettings {
    pub limit: usize,
    pub oversample_factor: usize,
    pub cooldown: Duration,
}

impl From<&TaggingConfig> for SuggestionSettings {
    fn from(config: &TaggingConfig) -> Self {
        Self {
            limit: config.max_suggestions,
            oversample_factor: config.oversample_factor,
            cooldown: config.cooldown(),
        }
    }
}

/// Runs one channel message through extraction, the graph, the tagging
/// decision and the suggestion engine, then replies in thread.
///
/// Every collaborator failure degrades to "no reply" plus a log line.
pub struct MessagePipeline {
    agent: AgentRuntime,
    graph: Arc<dyn TopicGraph>,
    engine: SuggestionEngine,
    gateway: Arc<dyn MessageGateway>,
    settings: SuggestionSettings,
}

impl MessagePipeline {
    pub fn new(
        agent: AgentRuntime,
        graph: Arc<dyn TopicGraph>,
        engine: SuggestionEngine,
        gateway: Arc<dyn MessageGateway>,
        settings: SuggestionSettings,
    ) -> Self {
        Self { agent, graph, engine, gateway, settings }
    }

    pub async fn process(
        &self,
        event: &ChannelMessageEvent,
        correlation_id: &str,
    ) -> PipelineOutcome {
        let member = self.member(&event.user_id, correlation_id).await;

        let relationships = self.agent.extractor.extract(&event.text).await;
        if relationships.is_empty() {
            debug!(
                event_name = "pipeline.no_topics",
                correlation_id,
                channel_id = %event.channel_id,
                user_id = %event.user_id,
                "no topics extracted, graph left untouched"
            );
            return PipelineOutcome::NoTopics;
        }

        let recorded =
            self.graph.record_relationships(&member, &relationships, Utc::now()).await;
        if let Err(error) = recorded {
            warn!(
                event_name = "pipeline.graph_update_failed",
                correlation_id,
                user_id = %event.user_id,
                error = %error,
                "topic graph update failed"
            );
        }

        let topics: Vec<String> =
            relationships.iter().map(|relationship| relationship.label.clone()).collect();
        let decision = self.agent.guardrail.decide(&event.channel_id, &topics).await;
        if let TaggingDecision::Skip { reason_code, .. } = decision {
            info!(
                event_name = "pipeline.tagging_skipped",
                correlation_id,
                channel_id = %event.channel_id,
                reason_code,
                "message not worth tagging members for"
            );
            return PipelineOutcome::Skipped { reason_code };
        }

        let expanded = self.agent.expander.expand(&topics).await;
        let request = SuggestionRequest::new(expanded)
            .excluding(event.user_id.clone())
            .with_limit(self.settings.limit)
            .with_oversample_factor(self.settings.oversample_factor)
            .with_cooldown(self.settings.cooldown);

        let outcome = match self.engine.suggest(request).await {
            Ok(outcome) => outcome,
            Err(error) => {
                error!(
                    event_name = "pipeline.suggest_failed",
                    correlation_id,
                    channel_id = %event.channel_id,
                    error = %error,
                    "member suggestion failed"
                );
                return PipelineOutcome::LookupFailed;
            }
        };
        if outcome.is_empty() {
            return PipelineOutcome::NoCandidates;
        }

        let user_ids = outcome.user_ids();
        let reply = self.agent.composer.compose(&event.text, &topics, &outcome.selected).await;

        // Cooldowns are already committed and stay committed if this fails.
        match self.gateway.post_thread_reply(&event.channel_id, &event.ts, &reply.text).await {
            Ok(posted) => {
                info!(
                    event_name = "pipeline.replied",
                    correlation_id,
                    channel_id = %posted.channel,
                    reply_ts = %posted.ts,
                    tagged = ?user_ids,
                    source = ?reply.source,
                    "tagging reply posted"
                );
                PipelineOutcome::Replied { user_ids, source: reply.source }
            }
            Err(error) => {
                error!(
                    event_name = "pipeline.delivery_failed",
                    correlation_id,
                    channel_id = %event.channel_id,
                    tagged = ?user_ids,
                    error = %error,
                    "tagging reply could not be posted"
                );
                PipelineOutcome::DeliveryFailed { user_ids }
            }
        }
    }

    async fn member(&self, user_id: &str, correlation_id: &str) -> CommunityMember {
        let member = CommunityMember::new(user_id);
        match self.gateway.display_name(user_id).await {
            Ok(Some(name)) => member.with_display_name(name),
            Ok(None) => member,
            Err(error) => {
                warn!(
                    event_name = "pipeline.display_name_failed",
                    correlation_id,
                    user_id,
                    error = %error,
                    "display name lookup failed"
                );
                member
            }
        }
    }
}

#[async_trait]
impl ChannelMessageService for MessagePipeline {
    async fn handle_channel_message(
        &self,
        event: &ChannelMessageEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        self.process(event, &ctx.correlation_id).await;
        Ok(())
    }
}
