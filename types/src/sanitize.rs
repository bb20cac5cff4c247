//! Model output sanitization for streamed replies.
//!
//! Local models leak template control tokens into their output, echo the
//! human's role prefix, and occasionally emit half-decoded bytes. This module
//! removes those artifacts from a reply buffer before it is displayed or
//! committed to history.
//!
//! # Pipeline
//!
//! The sanitizer is an ordered list of independent [`SanitizeStep`]s. Each one
//! is a pure `&str -> Cow<str>` rewrite that only ever removes text:
//!
//! 1. [`strip_leading_framing`] - first delta of a fresh reply only
//! 2. [`strip_control_markers`]
//! 3. [`strip_role_echo`]
//! 4. [`collapse_blank_lines`]
//! 5. [`strip_replacement_chars`]
//!
//! Steps run against the *whole* accumulated buffer rather than the newest
//! delta, because a control token can be split across several deltas.
//!
//! The pipeline repeats until nothing changes. A removal can splice two halves
//! of a marker together (`<th<think>ink>`) or join newline runs around a
//! removed character, so a single pass is not a fixpoint. Every changing pass
//! strictly shortens the text, which bounds the loop.

use std::borrow::Cow;
use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use regex::Regex;

/// Template control tokens that must never reach the transcript.
pub const CONTROL_MARKERS: [&str; 7] = [
    "<think>",
    "</think>",
    "<|im_start|>",
    "<|im_end|>",
    "<|endoftext|>",
    "<s>",
    "</s>",
];

/// Role prefix some models hallucinate when they start writing the next user turn.
pub const ROLE_ECHO_MARKER: &str = "Human:";

const REPLACEMENT_CHAR: char = '\u{FFFD}';

static CONTROL_MARKER_MATCHER: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::new(CONTROL_MARKERS).expect("control markers are valid literal patterns")
});

static COMMENT_OPENER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/\*+/").expect("comment opener pattern is valid"));

static COLON_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^:+").expect("colon run pattern is valid"));

static BLANK_LINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank line pattern is valid"));

/// Whether the leading-framing step participates in a sanitize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadingFraming {
    /// First delta of a fresh (non-continuation) reply.
    Strip,
    /// Every later delta, and every delta of a continuation.
    Keep,
}

/// A named rewrite in the sanitizer pipeline.
#[derive(Clone, Copy)]
pub struct SanitizeStep {
    pub name: &'static str,
    apply: for<'a> fn(&'a str) -> Cow<'a, str>,
}

impl SanitizeStep {
    #[must_use]
    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        (self.apply)(input)
    }
}

impl std::fmt::Debug for SanitizeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SanitizeStep")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Step 1, applied only for [`LeadingFraming::Strip`].
pub const LEADING_FRAMING_STEP: SanitizeStep = SanitizeStep {
    name: "strip_leading_framing",
    apply: strip_leading_framing,
};

/// Steps 2 through 5, applied on every delta.
pub const STREAM_STEPS: [SanitizeStep; 4] = [
    SanitizeStep {
        name: "strip_control_markers",
        apply: strip_control_markers,
    },
    SanitizeStep {
        name: "strip_role_echo",
        apply: strip_role_echo,
    },
    SanitizeStep {
        name: "collapse_blank_lines",
        apply: collapse_blank_lines,
    },
    SanitizeStep {
        name: "strip_replacement_chars",
        apply: strip_replacement_chars,
    },
];

/// Strip a leading `/**/`-style opener and then a leading run of colons.
///
/// Some fine-tunes open every reply with `/*/` or `::`; neither is ever
/// meaningful at the very start of an answer.
#[must_use]
pub fn strip_leading_framing(input: &str) -> Cow<'_, str> {
    let without_opener = match COMMENT_OPENER.find(input) {
        Some(found) => &input[found.end()..],
        None => input,
    };
    let without_colons = match COLON_RUN.find(without_opener) {
        Some(found) => &without_opener[found.end()..],
        None => without_opener,
    };
    if without_colons.len() == input.len() {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(without_colons.to_string())
    }
}

/// Remove every occurrence of every [`CONTROL_MARKERS`] entry.
#[must_use]
pub fn strip_control_markers(input: &str) -> Cow<'_, str> {
    if !CONTROL_MARKER_MATCHER.is_match(input) {
        return Cow::Borrowed(input);
    }
    let mut result = String::with_capacity(input.len());
    let mut last = 0;
    for found in CONTROL_MARKER_MATCHER.find_iter(input) {
        result.push_str(&input[last..found.start()]);
        last = found.end();
    }
    result.push_str(&input[last..]);
    Cow::Owned(result)
}

/// Remove every literal [`ROLE_ECHO_MARKER`].
#[must_use]
pub fn strip_role_echo(input: &str) -> Cow<'_, str> {
    if input.contains(ROLE_ECHO_MARKER) {
        Cow::Owned(input.replace(ROLE_ECHO_MARKER, ""))
    } else {
        Cow::Borrowed(input)
    }
}

/// Collapse runs of three or more newlines into exactly two.
#[must_use]
pub fn collapse_blank_lines(input: &str) -> Cow<'_, str> {
    BLANK_LINE_RUN.replace_all(input, "\n\n")
}

/// Remove U+FFFD left behind by decoding a partial multi-byte sequence.
#[must_use]
pub fn strip_replacement_chars(input: &str) -> Cow<'_, str> {
    if input.contains(REPLACEMENT_CHAR) {
        Cow::Owned(input.replace(REPLACEMENT_CHAR, ""))
    } else {
        Cow::Borrowed(input)
    }
}

/// Byte offset where a trailing, not yet complete marker starts.
///
/// A sanitized buffer ending in `<|im` may still lose that tail once the next
/// delta completes `<|im_end|>`. Text from the returned offset on is not
/// settled; `input.len()` means the whole buffer is.
#[must_use]
pub fn unsettled_marker_start(input: &str) -> usize {
    let longest = CONTROL_MARKERS
        .iter()
        .chain([&ROLE_ECHO_MARKER])
        .map(|marker| marker.len())
        .max()
        .unwrap_or(0);
    let floor = input.len().saturating_sub(longest);

    input
        .char_indices()
        .map(|(index, _)| index)
        .filter(|index| *index >= floor)
        .find(|index| {
            let tail = &input[*index..];
            CONTROL_MARKERS
                .iter()
                .chain([&ROLE_ECHO_MARKER])
                .any(|marker| marker.len() > tail.len() && marker.starts_with(tail))
        })
        .unwrap_or(input.len())
}

/// Sanitize an in-progress reply buffer.
///
/// Returns `Cow::Borrowed` when the buffer is already clean, which is the
/// common case for every delta after the first few.
///
/// # Examples
///
/// ```
/// use parlor_types::{LeadingFraming, sanitize_stream_text};
///
/// let dirty = "<|im_start|>Hello<|im_end|>\n\n\n\nthere";
/// assert_eq!(sanitize_stream_text(dirty, LeadingFraming::Keep), "Hello\n\nthere");
///
/// let clean = "Hello";
/// assert_eq!(sanitize_stream_text(clean, LeadingFraming::Keep), clean);
/// ```
#[must_use]
pub fn sanitize_stream_text(input: &str, framing: LeadingFraming) -> Cow<'_, str> {
    let mut current = Cow::Borrowed(input);
    loop {
        match sanitize_pass(&current, framing) {
            Some(changed) => current = Cow::Owned(changed),
            None => return current,
        }
    }
}

/// Final pass once streaming ends: collapse blank lines, then trim.
#[must_use]
pub fn finalize_stream_text(input: &str) -> Cow<'_, str> {
    match collapse_blank_lines(input) {
        Cow::Borrowed(text) => Cow::Borrowed(text.trim()),
        Cow::Owned(text) => Cow::Owned(text.trim().to_string()),
    }
}

/// One run over the pipeline. `None` means no step changed anything.
fn sanitize_pass(input: &str, framing: LeadingFraming) -> Option<String> {
    let leading = match framing {
        LeadingFraming::Strip => Some(LEADING_FRAMING_STEP),
        LeadingFraming::Keep => None,
    };

    let mut text = Cow::Borrowed(input);
    for step in leading.into_iter().chain(STREAM_STEPS) {
        let changed = match step.apply(&text) {
            Cow::Borrowed(_) => None,
            Cow::Owned(rewritten) => Some(rewritten),
        };
        if let Some(rewritten) = changed {
            text = Cow::Owned(rewritten);
        }
    }

    match text {
        Cow::Borrowed(_) => None,
        Cow::Owned(text) if text == input => None,
        Cow::Owned(text) => Some(text),
    }
}
