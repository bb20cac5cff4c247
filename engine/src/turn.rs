//! One request/response cycle.
//!
//! A [`Turn`] exists only while a reply is streaming; finishing it yields a
//! [`CompletedTurn`] that the session commits to history. Neither borrows the
//! session, so the host can redraw the transcript between steps.

use std::borrow::Cow;

use parlor_context::RemovedMessage;
use parlor_providers::ModelError;
use parlor_types::{LeadingFraming, Message, finalize_stream_text, sanitize_stream_text};
use thiserror::Error;

use crate::decode::DecodeStream;

/// Appended to partial replies while streaming.
pub const STREAMING_CURSOR: char = '▌';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    /// Answer a newly submitted question.
    Fresh,
    /// Extend the previous reply.
    Continuation,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("no model selected")]
    NoModel,
    #[error("a reply is still streaming")]
    Busy,
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// A rendered prompt ready to generate from.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    prompt: String,
    seed: String,
    kind: TurnKind,
    replaced: Option<RemovedMessage>,
}

impl TurnRequest {
    #[must_use]
    pub fn fresh(prompt: String) -> Self {
        Self {
            prompt,
            seed: String::new(),
            kind: TurnKind::Fresh,
            replaced: None,
        }
    }

    /// A continuation that regenerates `replaced`, starting from `seed`.
    #[must_use]
    pub fn continuation(prompt: String, seed: String, replaced: Option<RemovedMessage>) -> Self {
        Self {
            prompt,
            seed,
            kind: TurnKind::Continuation,
            replaced,
        }
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn seed(&self) -> &str {
        &self.seed
    }

    #[must_use]
    pub fn kind(&self) -> TurnKind {
        self.kind
    }

    #[must_use]
    pub fn replaced(&self) -> Option<&RemovedMessage> {
        self.replaced.as_ref()
    }

    pub(crate) fn into_parts(self) -> (String, String, TurnKind, Option<RemovedMessage>) {
        (self.prompt, self.seed, self.kind, self.replaced)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnProgress {
    /// Sanitized reply so far, ending in [`STREAMING_CURSOR`].
    Partial(String),
    Done,
}

/// A reply being streamed.
pub struct Turn {
    kind: TurnKind,
    stream: DecodeStream,
    buffer: String,
    /// Set once the sanitized buffer first holds text; leading framing is
    /// only stripped before that point.
    started: bool,
    done: bool,
    replaced: Option<RemovedMessage>,
}

impl Turn {
    pub(crate) fn new(
        seed: String,
        kind: TurnKind,
        stream: DecodeStream,
        replaced: Option<RemovedMessage>,
    ) -> Self {
        Self {
            kind,
            stream,
            started: !seed.is_empty(),
            buffer: seed,
            done: false,
            replaced,
        }
    }

    #[must_use]
    pub fn kind(&self) -> TurnKind {
        self.kind
    }

    /// Sanitized reply so far, without the cursor.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.buffer
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub fn steps(&self) -> usize {
        self.stream.steps()
    }

    /// Pull one delta and return the updated display text.
    ///
    /// After an error the turn is done; hand it to
    /// [`Session::abort_turn`](crate::Session::abort_turn).
    pub fn advance(&mut self) -> Result<TurnProgress, TurnError> {
        if self.done {
            return Ok(TurnProgress::Done);
        }
        match self.stream.next() {
            None => {
                self.done = true;
                Ok(TurnProgress::Done)
            }
            Some(Err(err)) => {
                self.done = true;
                tracing::warn!(error = %err, steps = self.stream.steps(), "generation failed");
                Err(TurnError::Model(err))
            }
            Some(Ok(delta)) => {
                self.buffer.push_str(&delta);
                self.sanitize();
                Ok(TurnProgress::Partial(self.display()))
            }
        }
    }

    fn sanitize(&mut self) {
        let framing = if self.kind == TurnKind::Fresh && !self.started {
            LeadingFraming::Strip
        } else {
            LeadingFraming::Keep
        };
        if let Cow::Owned(clean) = sanitize_stream_text(&self.buffer, framing) {
            self.buffer = clean;
        }
        if !self.buffer.is_empty() {
            self.started = true;
        }
    }

    fn display(&self) -> String {
        let mut display = String::with_capacity(self.buffer.len() + STREAMING_CURSOR.len_utf8());
        display.push_str(&self.buffer);
        display.push(STREAMING_CURSOR);
        display
    }

    /// Run the final sanitizer pass over the reply.
    #[must_use]
    pub fn finish(self) -> CompletedTurn {
        let content = finalize_stream_text(&self.buffer).into_owned();
        tracing::debug!(
            kind = ?self.kind,
            steps = self.stream.steps(),
            chars = content.chars().count(),
            "turn finished"
        );
        CompletedTurn {
            kind: self.kind,
            message: Message::assistant(content),
        }
    }

    pub(crate) fn into_replaced(self) -> Option<RemovedMessage> {
        self.replaced
    }
}

impl std::fmt::Debug for Turn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Turn")
            .field("kind", &self.kind)
            .field("steps", &self.stream.steps())
            .field("buffer_len", &self.buffer.len())
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// A finished reply awaiting commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTurn {
    kind: TurnKind,
    message: Message,
}

impl CompletedTurn {
    #[must_use]
    pub fn kind(&self) -> TurnKind {
        self.kind
    }

    #[must_use]
    pub fn content(&self) -> &str {
        self.message.content()
    }

    pub(crate) fn into_message(self) -> Message {
        self.message
    }
}
