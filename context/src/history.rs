//! Conversation history storage.
//!
//! The history always starts with the assistant greeting. Messages are only
//! appended, except for the explicit removals used by clear, continue and
//! turn rollback.

use parlor_types::Message;

/// Default number of prior messages recalled into a new prompt.
pub const DEFAULT_MEMORY_MESSAGES: usize = 5;

/// A message taken out of the history, remembered with its position so it
/// can be put back if the operation that removed it fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedMessage {
    index: usize,
    message: Message,
}

impl RemovedMessage {
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }
}

#[derive(Debug, Clone)]
pub struct ConversationHistory {
    greeting: String,
    messages: Vec<Message>,
}

impl ConversationHistory {
    #[must_use]
    pub fn new(greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        let messages = vec![Message::assistant(greeting.clone())];
        Self { greeting, messages }
    }

    #[must_use]
    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Never true: the greeting is always present. Provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn append(&mut self, message: Message) {
        tracing::trace!(role = %message.role(), len = self.messages.len(), "history append");
        self.messages.push(message);
    }

    /// Reset to the lone greeting.
    pub fn clear(&mut self) {
        self.messages.truncate(1);
        if let Some(first) = self.messages.first_mut() {
            *first = Message::assistant(self.greeting.clone());
        } else {
            self.messages.push(Message::assistant(self.greeting.clone()));
        }
    }

    /// Remove the last message matching `predicate`, scanning from the end.
    ///
    /// The removed message keeps its index so [`restore`](Self::restore) can
    /// put it back; nothing is removed when none match.
    pub fn remove_last_matching<F>(&mut self, predicate: F) -> Option<RemovedMessage>
    where
        F: Fn(&Message) -> bool,
    {
        let index = self.messages.iter().rposition(predicate)?;
        let message = self.messages.remove(index);
        tracing::trace!(index, "history remove");
        Some(RemovedMessage { index, message })
    }

    /// Remove the most recent real assistant reply, keeping its position.
    pub fn take_last_reply(&mut self) -> Option<RemovedMessage> {
        let greeting = self.greeting.clone();
        self.remove_last_matching(|message| is_reply_to(&greeting, message))
    }

    /// Put a removed message back where it was.
    ///
    /// The index is clamped so the greeting stays first even if the history
    /// shrank in the meantime.
    pub fn restore(&mut self, removed: RemovedMessage) {
        let index = removed.index.clamp(1, self.messages.len());
        tracing::trace!(index, "history restore");
        self.messages.insert(index, removed.message);
    }

    /// Most recent user message.
    #[must_use]
    pub fn last_user(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|message| message.is_user())
    }

    /// Most recent assistant message that is not the greeting.
    #[must_use]
    pub fn last_reply(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|message| is_reply_to(&self.greeting, message))
    }

    /// Pop the trailing message if it is an unanswered user message.
    ///
    /// Used to roll back a turn whose generation failed.
    pub fn pop_pending_user(&mut self) -> Option<Message> {
        if self.messages.len() > 1 && self.messages.last().is_some_and(Message::is_user) {
            self.messages.pop()
        } else {
            None
        }
    }

    /// Messages recalled as context for the prompt being built.
    ///
    /// With more than two messages, returns up to `max_len` messages ending
    /// just before the last one (the question being asked right now) and never
    /// reaching back to the greeting at index 0. With two or fewer, the
    /// conversation has no answered exchange yet and the window is empty.
    #[must_use]
    pub fn memory_window(&self, max_len: usize) -> &[Message] {
        let len = self.messages.len();
        if len <= 2 {
            return &[];
        }
        let end = len - 1;
        let start = end.saturating_sub(max_len).max(1);
        &self.messages[start..end]
    }
}

/// Assistant messages that are real replies rather than the greeting.
fn is_reply_to(greeting: &str, message: &Message) -> bool {
    message.is_assistant() && message.content() != greeting
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREETING: &str = "How can I help you?";

    fn history_with(len: usize) -> ConversationHistory {
        let mut history = ConversationHistory::new(GREETING);
        for i in 1..len {
            if i % 2 == 1 {
                history.append(Message::try_user(format!("q{i}")).unwrap());
            } else {
                history.append(Message::assistant(format!("a{i}")));
            }
        }
        history
    }

    #[test]
    fn starts_with_greeting() {
        let history = ConversationHistory::new(GREETING);
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0], Message::assistant(GREETING));
    }

    #[test]
    fn clear_resets_to_greeting_regardless_of_length() {
        for len in [1, 2, 5, 12] {
            let mut history = history_with(len);
            history.clear();
            assert_eq!(history.messages(), &[Message::assistant(GREETING)]);
        }
    }

    #[test]
    fn memory_window_empty_for_short_history() {
        assert!(history_with(1).memory_window(5).is_empty());
        assert!(history_with(2).memory_window(5).is_empty());
    }

    #[test]
    fn memory_window_excludes_greeting_and_last() {
        let history = history_with(7);
        let window = history.memory_window(5);
        assert_eq!(window, &history.messages()[1..6]);
        assert_eq!(window.len(), 5);
    }

    #[test]
    fn memory_window_bounded_by_max_len() {
        let history = history_with(12);
        let window = history.memory_window(5);
        assert_eq!(window, &history.messages()[6..11]);
    }

    #[test]
    fn memory_window_three_messages() {
        let history = history_with(3);
        assert_eq!(history.memory_window(5), &history.messages()[1..2]);
    }

    #[test]
    fn take_last_reply_skips_greeting_text() {
        let mut history = ConversationHistory::new(GREETING);
        history.append(Message::try_user("first").unwrap());
        history.append(Message::assistant("real answer"));
        history.append(Message::try_user("second").unwrap());
        history.append(Message::assistant(GREETING));

        let removed = history.take_last_reply().unwrap();
        assert_eq!(removed.index(), 2);
        assert_eq!(removed.message().content(), "real answer");
        assert_eq!(history.len(), 4);
        assert_eq!(history.messages()[2].content(), "second");
        assert_eq!(history.messages()[3].content(), GREETING);
    }

    #[test]
    fn remove_last_matching_removes_nothing_without_match() {
        let mut history = history_with(3);
        let removed = history.remove_last_matching(|m| m.content() == "missing");
        assert!(removed.is_none());
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn remove_last_matching_scans_from_the_end() {
        let mut history = history_with(5);
        let removed = history
            .remove_last_matching(Message::is_user)
            .unwrap();
        assert_eq!(removed.index(), 3);
        assert_eq!(removed.message().content(), "q3");
        history.restore(removed);
        assert_eq!(history.messages()[3].content(), "q3");
    }

    #[test]
    fn last_user_and_last_reply() {
        let history = history_with(5);
        assert_eq!(history.last_user().unwrap().content(), "q3");
        assert_eq!(history.last_reply().unwrap().content(), "a4");

        let fresh = ConversationHistory::new(GREETING);
        assert!(fresh.last_user().is_none());
        assert!(fresh.last_reply().is_none());
    }

    #[test]
    fn pop_pending_user_only_pops_unanswered_question() {
        let mut history = history_with(3);
        assert!(history.pop_pending_user().is_none());

        history.append(Message::try_user("pending").unwrap());
        assert_eq!(history.pop_pending_user().unwrap().content(), "pending");
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn take_and_restore_reply_round_trips_position() {
        let mut history = history_with(5);
        let before = history.messages().to_vec();

        let removed = history.take_last_reply().unwrap();
        assert_eq!(removed.index(), 4);
        assert_eq!(removed.message().content(), "a4");
        assert_eq!(history.len(), 4);

        history.restore(removed);
        assert_eq!(history.messages(), before.as_slice());
    }

    #[test]
    fn restore_never_displaces_greeting() {
        let mut history = history_with(3);
        let removed = history.take_last_reply().unwrap();
        history.clear();
        history.restore(removed);
        assert_eq!(history.messages()[0].content(), GREETING);
        assert_eq!(history.messages()[1].content(), "a2");
    }
}
