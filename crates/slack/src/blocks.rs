use serde::Serialize;

use pesto_core::suggestions::CooldownStats;

/// Rows rendered before the cooldown list is summarized.
pub const COOLDOWN_REPORT_MAX_ROWS: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
}

/// Message body in the shape Slack accepts for `chat.postMessage` and
/// slash command responses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(rename = "text")]
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

pub fn cooldown_report_message(stats: &CooldownStats) -> MessageTemplate {
    let summary = format!("{} member(s) in cooldown", stats.active);
    if stats.users.is_empty() {
        return MessageBuilder::new(summary)
            .section("pesto.cooldowns.empty.v1", |section| {
                section.mrkdwn("Nobody is in cooldown right now. Everyone is taggable.");
            })
            .build();
    }

    let mut lines: Vec<String> = stats
        .users
        .iter()
        .take(COOLDOWN_REPORT_MAX_ROWS)
        .map(|user| format!("• <@{}> {}", user.user_id, format_remaining(user.remaining_secs)))
        .collect();
    if stats.users.len() > COOLDOWN_REPORT_MAX_ROWS {
        lines.push(format!("…and {} more", stats.users.len() - COOLDOWN_REPORT_MAX_ROWS));
    }

    MessageBuilder::new(summary.clone())
        .section("pesto.cooldowns.summary.v1", |section| {
            section.mrkdwn(format!("*{summary}*\n{}", lines.join("\n")));
        })
        .context("pesto.cooldowns.context.v1", |context| {
            context.plain(format!(
                "{} tracked entr{} including expired ones awaiting cleanup",
                stats.tracked,
                if stats.tracked == 1 { "y" } else { "ies" }
            ));
        })
        .build()
}

pub fn format_remaining(secs: u64) -> String {
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m left")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s left")
    } else {
        format!("{seconds}s left")
    }
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("pesto.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("pesto.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn help_message() -> MessageTemplate {
    MessageBuilder::new("Pesto command help")
        .section("pesto.help.summary.v1", |section| {
            section.mrkdwn(
                "*Available commands*\n• `/pesto cooldowns` shows who is resting from tags\n• `/pesto help`",
            );
        })
        .build()
}

#[cfg(test)]
mod tests {
    use pesto_core::suggestions::{CooldownStats, UserCooldown};

    use super::{
        cooldown_report_message, error_message, format_remaining, Block, MessageBuilder,
        TextObject, COOLDOWN_REPORT_MAX_ROWS,
    };

    fn stats(count: usize) -> CooldownStats {
        CooldownStats {
            tracked: count + 1,
            active: count,
            users: (0..count)
                .map(|index| UserCooldown {
                    user_id: format!("U{index}"),
                    remaining_secs: 3_600 - index as u64,
                })
                .collect(),
        }
    }

    #[test]
    fn message_builder_creates_typed_block_structure() {
        let message = MessageBuilder::new("fallback")
            .section("pesto.summary.v1", |section| {
                section.mrkdwn("*Summary*");
            })
            .context("pesto.summary.context.v1", |context| {
                context.plain("details");
            })
            .build();

        assert_eq!(message.blocks.len(), 2);
        assert!(matches!(
            &message.blocks[0],
            Block::Section { block_id, text: TextObject::Mrkdwn { text } }
                if block_id == "pesto.summary.v1" && text == "*Summary*"
        ));
    }

    #[test]
    fn serializes_in_slack_block_kit_shape() {
        let json = serde_json::to_value(error_message("boom", "env-1")).expect("serialize");

        assert_eq!(json["text"], "boom");
        assert_eq!(json["blocks"][0]["type"], "section");
        assert_eq!(json["blocks"][0]["text"]["type"], "mrkdwn");
        assert_eq!(json["blocks"][1]["elements"][0]["type"], "plain_text");
        assert_eq!(json["blocks"][1]["elements"][0]["text"], "Correlation ID: env-1");
    }

    #[test]
    fn empty_cooldown_report_says_so() {
        let message = cooldown_report_message(&CooldownStats::default());

        assert_eq!(message.fallback_text, "0 member(s) in cooldown");
        assert_eq!(message.blocks.len(), 1);
    }

    #[test]
    fn cooldown_report_lists_members_and_truncates() {
        let message = cooldown_report_message(&stats(COOLDOWN_REPORT_MAX_ROWS + 2));

        let Block::Section { text: TextObject::Mrkdwn { text }, .. } = &message.blocks[0] else {
            panic!("expected mrkdwn section");
        };
        assert!(text.contains("<@U0> 1h 00m left"));
        assert!(!text.contains(&format!("<@U{}>", COOLDOWN_REPORT_MAX_ROWS)));
        assert!(text.ends_with("…and 2 more"));
    }

    #[test]
    fn remaining_time_is_human_readable() {
        assert_eq!(format_remaining(3_725), "1h 02m left");
        assert_eq!(format_remaining(125), "2m 05s left");
        assert_eq!(format_remaining(9), "9s left");
    }
}
