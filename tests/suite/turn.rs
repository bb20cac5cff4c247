//! End-to-end turn tests against the scripted model

use parlor_engine::{TokenCap, TurnError, TurnKind, TurnPhase, TurnProgress};

use crate::common::{GREETING, ScriptedModel, ask, session, transcript};

#[test]
fn hi_end_to_end() {
    let model = ScriptedModel::chatml();
    model.reply(&["<think>", "\n", "</think>", "Hello", "! How", " are you?", "<|im_end|>"]);
    let mut session = session(&model);

    let reply = ask(&mut session, "hi");

    assert_eq!(reply, "Hello! How are you?");
    assert_eq!(
        transcript(&session),
        [
            format!("assistant: {GREETING}"),
            "user: hi".to_string(),
            "assistant: Hello! How are you?".to_string(),
        ]
    );
}

#[test]
fn split_multibyte_character_never_shows_replacement() {
    let model = ScriptedModel::chatml();
    model.reply_bytes(&[b"caf", &[0xC3], &[0xA9], b"!"]);
    let mut session = session(&model);

    let request = session.submit("coffee?").unwrap();
    let mut partials = Vec::new();
    let reply = session
        .run_turn(request, |display| partials.push(display.to_string()))
        .unwrap()
        .content()
        .to_string();

    assert_eq!(partials, ["caf▌", "caf▌", "café▌", "café!▌"]);
    assert_eq!(reply, "café!");
}

#[test]
fn dangling_byte_at_end_is_flushed_then_cleaned() {
    let model = ScriptedModel::chatml();
    model.reply_bytes(&[b"ok", &[0xE2, 0x82]]);
    let mut session = session(&model);
    assert_eq!(ask(&mut session, "q"), "ok");
}

#[test]
fn later_turns_recall_a_bounded_window() {
    let model = ScriptedModel::chatml();
    for answer in ["a1", "a2", "a3", "a4"] {
        model.reply(&[answer]);
    }
    let mut session = session(&model);
    for question in ["q1", "q2", "q3", "q4"] {
        ask(&mut session, question);
    }

    // Before a4: [greeting, q1, a1, q2, a2, q3, a3, q4]; window of 5 starts at a1.
    let prompt = model.last_prompt();
    assert!(!prompt.contains("q1"));
    assert!(!prompt.contains(GREETING));
    let positions: Vec<usize> = ["a1", "q2", "a2", "q3", "a3", "q4"]
        .iter()
        .map(|needle| prompt.find(needle).unwrap())
        .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(session.history().len(), 9);
}

#[test]
fn token_cap_bounds_generation_steps() {
    let model = ScriptedModel::chatml();
    model.reply(&["word "; 200]);
    let mut session = session(&model);
    session.set_token_cap(TokenCap::new(TokenCap::MIN).unwrap());

    let request = session.submit("ramble").unwrap();
    let mut turn = session.begin_turn(request).unwrap();
    while let TurnProgress::Partial(_) = turn.advance().unwrap() {}

    assert_eq!(turn.steps(), TokenCap::MIN as usize);
    let completed = turn.finish();
    assert_eq!(completed.kind(), TurnKind::Fresh);
    assert_eq!(completed.content().split_whitespace().count(), TokenCap::MIN as usize);
    session.commit(completed);
    assert_eq!(session.phase(), TurnPhase::Idle);
}

#[test]
fn failure_mid_stream_discards_partial_and_question() {
    let model = ScriptedModel::chatml();
    model.reply_then_fail(&["Half an", " answer"]);
    model.reply(&["Whole answer"]);
    let mut session = session(&model);

    let request = session.submit("q").unwrap();
    let mut turn = session.begin_turn(request).unwrap();
    assert_eq!(
        turn.advance().unwrap(),
        TurnProgress::Partial("Half an▌".to_string())
    );
    assert_eq!(turn.text(), "Half an");
    turn.advance().unwrap();
    assert!(matches!(turn.advance(), Err(TurnError::Model(_))));
    assert!(turn.is_done());

    session.abort_turn(turn);
    assert_eq!(transcript(&session), [format!("assistant: {GREETING}")]);
    assert_eq!(session.phase(), TurnPhase::Idle);

    assert_eq!(ask(&mut session, "q"), "Whole answer");
}

#[test]
fn turn_needs_a_selected_model() {
    let model = ScriptedModel::chatml();
    let mut session = session(&model);
    session.select_model("Pick a model").unwrap();
    assert!(matches!(session.submit("hi"), Err(TurnError::NoModel)));
    assert!(matches!(
        session.prepare_continuation(),
        Err(TurnError::NoModel)
    ));
}
