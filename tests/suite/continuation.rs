//! Continuing a reply that stopped early

use parlor_engine::{TurnKind, TurnPhase, TurnProgress};

use crate::common::{GREETING, ScriptedModel, ask, continue_reply, session, transcript};

#[test]
fn continuation_replaces_the_cut_reply() {
    let model = ScriptedModel::chatml();
    model.reply(&["1\n", "2\n", "3 and th"]);
    model.reply(&["\n3\n", "4"]);
    let mut session = session(&model);

    assert_eq!(ask(&mut session, "count to 4"), "1\n2\n3 and th");
    assert_eq!(continue_reply(&mut session), "1\n2\n3\n4");

    // The prompt ends inside the reply, after the dropped last line.
    assert!(model.last_prompt().ends_with("<|im_start|>assistant\n1\n2<|im_end|>"));
    assert_eq!(
        transcript(&session),
        [
            format!("assistant: {GREETING}"),
            "user: count to 4".to_string(),
            "assistant: 1\n2\n3\n4".to_string(),
        ]
    );
}

#[test]
fn continuing_twice_keeps_extending() {
    let model = ScriptedModel::chatml();
    model.reply(&["a\nb"]);
    model.reply(&["\nb\nc"]);
    model.reply(&["\nc\nd"]);
    let mut session = session(&model);

    ask(&mut session, "letters");
    continue_reply(&mut session);
    assert_eq!(continue_reply(&mut session), "a\nb\nc\nd");
    assert_eq!(session.history().len(), 3);
}

#[test]
fn single_line_reply_is_resumed_whole() {
    let model = ScriptedModel::chatml();
    model.reply(&["Hello"]);
    model.reply(&[" world"]);
    let mut session = session(&model);

    ask(&mut session, "greet");
    assert_eq!(continue_reply(&mut session), "Hello world");
}

#[test]
fn continuation_prompt_uses_only_the_last_exchange() {
    let model = ScriptedModel::chatml();
    model.reply(&["first answer"]);
    model.reply(&["second answer"]);
    model.reply(&[" more"]);
    let mut session = session(&model);

    ask(&mut session, "first question");
    ask(&mut session, "second question");
    continue_reply(&mut session);

    let prompt = model.last_prompt();
    assert!(!prompt.contains("first"));
    assert!(prompt.contains("second question"));
}

#[test]
fn continuation_keeps_leading_punctuation() {
    let model = ScriptedModel::chatml();
    model.reply(&["Total"]);
    model.reply(&[":: 42"]);
    let mut session = session(&model);

    ask(&mut session, "sum");
    assert_eq!(continue_reply(&mut session), "Total:: 42");
}

#[test]
fn failed_continuation_restores_the_previous_reply() {
    let model = ScriptedModel::chatml();
    model.reply(&["1\n2\n3"]);
    model.reply_then_fail(&["\nthree"]);
    let mut session = session(&model);

    ask(&mut session, "count");
    let before = transcript(&session);

    let request = session.prepare_continuation().unwrap().unwrap();
    assert_eq!(request.kind(), TurnKind::Continuation);
    assert_eq!(request.seed(), "1\n2");
    let mut turn = session.begin_turn(request).unwrap();
    assert_eq!(
        turn.advance().unwrap(),
        TurnProgress::Partial("1\n2\nthree▌".to_string())
    );
    assert!(turn.advance().is_err());
    session.abort_turn(turn);

    assert_eq!(transcript(&session), before);
    assert_eq!(session.phase(), TurnPhase::Idle);
}

#[test]
fn nothing_to_continue_before_the_first_reply() {
    let model = ScriptedModel::chatml();
    let mut session = session(&model);
    assert!(session.prepare_continuation().unwrap().is_none());
    assert_eq!(transcript(&session), [format!("assistant: {GREETING}")]);
    assert!(model.prompts().is_empty());
}
