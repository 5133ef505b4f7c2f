use std::fmt;

/// The bot's own Slack user, resolved once through `auth.test`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    user_id: String,
}

impl BotIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into() }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Mention markup Slack inserts into message text, e.g. `<@U0LAN0Z89>`.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }
}

impl fmt::Display for BotIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_id)
    }
}
