use serde::{Deserialize, Serialize};

/// A community member as the bot knows them: the Slack user id plus the most
/// recently observed display name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommunityMember {
    pub user_id: String,
    pub display_name: Option<String>,
}

impl CommunityMember {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), display_name: None }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        self.display_name = (!display_name.trim().is_empty()).then_some(display_name);
        self
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.user_id)
    }
}
