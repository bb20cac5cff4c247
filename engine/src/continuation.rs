//! Resuming a reply that stopped too early.
//!
//! The last line of the previous reply may have been cut mid-word or
//! mid-number, so it is dropped before the reply is fed back as the start of
//! a new assistant turn.

use parlor_context::ConversationHistory;
use parlor_types::Message;

/// Drop the final `\n`-separated line; single-line text is returned as is.
#[must_use]
pub fn drop_last_line(text: &str) -> &str {
    match text.rfind('\n') {
        Some(index) => &text[..index],
        None => text,
    }
}

/// What a continuation resumes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationPlan {
    pub question: Message,
    pub partial: String,
}

impl ContinuationPlan {
    /// Pair the last question with the trimmed last real reply.
    ///
    /// `None` when there is no question or no reply other than the greeting.
    #[must_use]
    pub fn from_history(history: &ConversationHistory) -> Option<Self> {
        let question = history.last_user()?.clone();
        let reply = history.last_reply()?;
        Some(Self {
            question,
            partial: drop_last_line(reply.content()).to_string(),
        })
    }
}
