//! Conversation history tests

use parlor_context::ConversationHistory;
use parlor_types::{Message, Role};

use crate::common::GREETING;

/// Greeting followed by `exchanges` question/answer pairs.
fn conversation(exchanges: usize) -> ConversationHistory {
    let mut history = ConversationHistory::new(GREETING);
    for i in 1..=exchanges {
        history.append(Message::try_user(format!("q{i}")).unwrap());
        history.append(Message::assistant(format!("a{i}")));
    }
    history
}

#[test]
fn greeting_is_always_first() {
    let mut history = conversation(3);
    assert_eq!(history.messages()[0], Message::assistant(GREETING));
    history.clear();
    assert_eq!(history.messages(), [Message::assistant(GREETING)]);
    assert_eq!(history.len(), 1);
}

#[test]
fn memory_window_never_reaches_greeting_or_question() {
    for exchanges in 0..6 {
        let mut history = conversation(exchanges);
        history.append(Message::try_user("now").unwrap());
        for max_len in 0..8 {
            let window = history.memory_window(max_len);
            assert!(window.len() <= max_len);
            assert!(
                window.iter().all(|m| m.content() != GREETING),
                "greeting leaked with {exchanges} exchanges, max {max_len}"
            );
            assert!(window.iter().all(|m| m.content() != "now"));
            // The window is the tail just before the question.
            if let Some(last) = window.last() {
                assert_eq!(last.content(), format!("a{exchanges}"));
            }
        }
    }
}

#[test]
fn memory_window_of_seven_messages() {
    // [greeting, q1, a1, q2, a2, q3, a3] -> indices 1..=5 with the default size.
    let history = conversation(3);
    let window: Vec<&str> = history.memory_window(5).iter().map(Message::content).collect();
    assert_eq!(window, ["q1", "a1", "q2", "a2", "q3"]);
}

#[test]
fn reply_lookup_skips_greeting() {
    let mut history = conversation(0);
    assert!(history.last_reply().is_none());
    assert!(history.take_last_reply().is_none());

    history.append(Message::try_user("q").unwrap());
    history.append(Message::assistant("a"));
    assert_eq!(history.last_reply().map(Message::content), Some("a"));
    assert_eq!(history.last_user().map(Message::content), Some("q"));
}

#[test]
fn greeting_text_reply_is_not_taken() {
    // [greeting, user, assistant, user, greeting-as-assistant]
    let mut history = conversation(1);
    history.append(Message::try_user("again").unwrap());
    history.append(Message::assistant(GREETING));

    let removed = history.take_last_reply().unwrap();
    assert_eq!(removed.index(), 2);
    assert_eq!(removed.message().content(), "a1");
    let remaining: Vec<&str> = history.messages().iter().map(Message::content).collect();
    assert_eq!(remaining, [GREETING, "q1", "again", GREETING]);
}

#[test]
fn remove_last_matching_feeds_restore() {
    let mut history = conversation(2);
    let before = history.messages().to_vec();
    let removed = history
        .remove_last_matching(|message| message.role() == Role::User)
        .unwrap();
    assert_eq!(removed.message().content(), "q2");
    history.restore(removed);
    assert_eq!(history.messages(), before.as_slice());
}

#[test]
fn take_and_restore_keeps_order() {
    let mut history = conversation(2);
    let before = history.messages().to_vec();

    let removed = history.take_last_reply().unwrap();
    assert_eq!(removed.message().content(), "a2");
    assert_eq!(history.len(), before.len() - 1);

    history.restore(removed);
    assert_eq!(history.messages(), before.as_slice());
}

#[test]
fn pending_user_pop_only_removes_unanswered_question() {
    let mut history = conversation(1);
    assert!(history.pop_pending_user().is_none());

    history.append(Message::try_user("unanswered").unwrap());
    assert_eq!(
        history.pop_pending_user().map(|m| m.content().to_string()),
        Some("unanswered".to_string())
    );
    assert_eq!(history.len(), 3);
}
