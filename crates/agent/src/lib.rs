//! Model-backed steps of the Pesto message pipeline
//!
//! Every step degrades instead of failing: extraction yields no topics,
//! expansion keeps the canonical topics, the tagging decision falls back to a
//! keyword heuristic, and the reply falls back to a fixed template.
//!
//! # Key Types
//!
//! - `LlmClient` - Pluggable completion trait, with an OpenAI-compatible client
//! - `TaggingGuardrail` - Decides whether a message is worth tagging for
//! - `AgentRuntime` - Bundles the steps over one shared client
//!
//! The model never picks who gets tagged. Candidates come from the topic
//! graph and the cooldown-aware selector in `pesto-core`.

pub mod guardrails;
pub mod llm;
pub mod prompts;
pub mod reply;
pub mod runtime;
pub mod topics;

#[cfg(test)]
mod testing;

pub use guardrails::{TaggingDecision, TaggingGuardrail, TaggingPolicy};
pub use llm::{CompletionRequest, LlmClient, LlmError, OpenAiChatClient};
pub use reply::{ComposedReply, ReplyComposer, ReplySource};
pub use runtime::AgentRuntime;
pub use topics::{TopicExpander, TopicExtractor};
