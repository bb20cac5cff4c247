//! Reply sanitizer tests

use parlor_types::{
    CONTROL_MARKERS, LeadingFraming, finalize_stream_text, sanitize_stream_text,
};

/// Accumulate deltas the way a streaming turn does, sanitizing the whole
/// buffer after each one.
fn stream(deltas: &[&str], framing: LeadingFraming) -> Vec<String> {
    let mut buffer = String::new();
    let mut snapshots = Vec::new();
    for delta in deltas {
        buffer.push_str(delta);
        buffer = sanitize_stream_text(&buffer, framing).into_owned();
        snapshots.push(buffer.clone());
    }
    snapshots
}

#[test]
fn every_control_marker_is_removed() {
    for marker in CONTROL_MARKERS {
        let dirty = format!("before{marker}after");
        assert_eq!(
            sanitize_stream_text(&dirty, LeadingFraming::Keep),
            "beforeafter",
            "marker {marker} survived"
        );
    }
}

#[test]
fn marker_split_across_deltas_disappears_once_complete() {
    let snapshots = stream(&["Hi", "<|im", "_end|>", " there"], LeadingFraming::Keep);
    assert_eq!(snapshots, ["Hi", "Hi<|im", "Hi", "Hi there"]);
}

#[test]
fn spliced_markers_are_removed_to_a_fixpoint() {
    assert_eq!(
        sanitize_stream_text("<th<think>ink>ok", LeadingFraming::Keep),
        "ok"
    );
    assert_eq!(
        sanitize_stream_text("<|im_<|im_end|>end|>done", LeadingFraming::Keep),
        "done"
    );
}

#[test]
fn removing_a_character_can_create_a_blank_run() {
    assert_eq!(
        sanitize_stream_text("a\n\n\u{FFFD}\nb", LeadingFraming::Keep),
        "a\n\nb"
    );
}

#[test]
fn sanitizing_is_idempotent() {
    let samples = [
        "plain answer",
        "<think></think>\n\n\n\nHuman: hi",
        "::/**/x",
        "caf\u{FFFD}\u{FFFD}<s>",
        "Human:Human: twice",
    ];
    for framing in [LeadingFraming::Strip, LeadingFraming::Keep] {
        for sample in samples {
            let once = sanitize_stream_text(sample, framing).into_owned();
            let twice = sanitize_stream_text(&once, framing).into_owned();
            assert_eq!(once, twice, "not a fixpoint for {sample:?}");
        }
    }
}

#[test]
fn role_echo_is_dropped() {
    assert_eq!(
        sanitize_stream_text("Sure.\nHuman: next question", LeadingFraming::Keep),
        "Sure.\n next question"
    );
}

#[test]
fn leading_framing_is_only_stripped_when_asked() {
    assert_eq!(sanitize_stream_text("::answer", LeadingFraming::Strip), "answer");
    assert_eq!(sanitize_stream_text("/**/::answer", LeadingFraming::Strip), "answer");
    assert_eq!(sanitize_stream_text("::answer", LeadingFraming::Keep), "::answer");
    // Only at the very start.
    assert_eq!(
        sanitize_stream_text("ratio 2::1", LeadingFraming::Strip),
        "ratio 2::1"
    );
}

#[test]
fn clean_text_is_borrowed() {
    let clean = "Nothing to do here.\n\nReally.";
    assert!(matches!(
        sanitize_stream_text(clean, LeadingFraming::Strip),
        std::borrow::Cow::Borrowed(_)
    ));
}

#[test]
fn finalize_collapses_and_trims() {
    assert_eq!(finalize_stream_text("\n  text\n\n\n\nmore  \n"), "text\n\nmore");
    assert_eq!(finalize_stream_text("done"), "done");
}
