/// Reply posted in place of an answer when the answer service fails.
pub const APP_FAILURE_MESSAGE: &str = "アプリに問題が発生しました";

/// Failure classes the bot distinguishes. Only the startup classes end the
/// process; everything else is isolated to the event that raised it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    StartupConfiguration,
    IdentityResolution,
    EventDecode,
    AnswerService,
    ReplyDelivery,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartupConfiguration => "startup_configuration",
            Self::IdentityResolution => "identity_resolution",
            Self::EventDecode => "event_decode",
            Self::AnswerService => "answer_service",
            Self::ReplyDelivery => "reply_delivery",
        }
    }

    /// Text shown in Slack for this failure, if any is shown at all.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::AnswerService => Some(APP_FAILURE_MESSAGE),
            Self::StartupConfiguration
            | Self::IdentityResolution
            | Self::EventDecode
            | Self::ReplyDelivery => None,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
