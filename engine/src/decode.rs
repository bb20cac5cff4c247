//! Incremental decoding of sampled tokens into text deltas.
//!
//! Tokens do not map one-to-one onto characters: a multi-byte character can
//! span several tokens, and some tokenizers rewrite earlier text when a merge
//! completes. Each step therefore decodes the whole token list and yields only
//! the part not emitted yet.

use std::iter::FusedIterator;
use std::sync::Arc;

use parlor_providers::{LocalModel, ModelError, TokenId, TokenStream};
use parlor_types::{SamplingParams, TokenCap};

/// Decoders render an incomplete UTF-8 sequence as this character.
const INCOMPLETE_SEQUENCE: char = '\u{FFFD}';

/// Lazy, finite, non-restartable sequence of text deltas for one generation.
///
/// At most `cap` tokens are pulled from the sampler and at most `cap` deltas
/// are yielded. Errors from the sampler or decoder are yielded once and end
/// the stream.
pub struct DecodeStream {
    model: Arc<dyn LocalModel>,
    sampler: TokenStream,
    tokens: Vec<TokenId>,
    /// Text already handed out, as one string.
    emitted: String,
    /// Latest decoded text, when it ran ahead of `emitted`.
    held: Option<String>,
    steps: usize,
    cap: usize,
    finished: bool,
}

impl DecodeStream {
    pub fn new(
        model: Arc<dyn LocalModel>,
        prompt: &str,
        cap: TokenCap,
        params: &SamplingParams,
    ) -> Result<Self, ModelError> {
        let prompt_tokens = model.encode(prompt)?;
        tracing::debug!(
            prompt_tokens = prompt_tokens.len(),
            cap = cap.get(),
            "starting generation"
        );
        let sampler = model.sample(&prompt_tokens, params)?;
        Ok(Self {
            model,
            sampler,
            tokens: Vec::new(),
            emitted: String::new(),
            held: None,
            steps: 0,
            cap: cap.as_usize(),
            finished: false,
        })
    }

    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    fn step(&mut self, token: TokenId) -> Result<String, ModelError> {
        self.tokens.push(token);
        self.steps += 1;

        let text = self.model.decode(&self.tokens)?;
        let last_step = self.steps >= self.cap;
        if !last_step && text.ends_with(INCOMPLETE_SEQUENCE) {
            self.held = Some(text);
            return Ok(String::new());
        }
        self.held = None;
        Ok(self.emit(text))
    }

    /// Record `text` as emitted and return the part the consumer has not seen.
    fn emit(&mut self, text: String) -> String {
        let common = common_prefix_len(&self.emitted, &text);
        if common < self.emitted.len() {
            tracing::trace!(
                emitted = self.emitted.len(),
                common,
                "decoder rewrote earlier text"
            );
        }
        let delta = text[common..].to_string();
        self.emitted = text;
        delta
    }
}

impl Iterator for DecodeStream {
    type Item = Result<String, ModelError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.steps >= self.cap {
            self.finished = true;
            return None;
        }

        match self.sampler.next() {
            Some(Ok(sampled)) => {
                let result = self.step(sampled.id);
                if result.is_err() || self.steps >= self.cap {
                    self.finished = true;
                }
                Some(result)
            }
            Some(Err(err)) => {
                self.finished = true;
                Some(Err(err))
            }
            None => {
                self.finished = true;
                let held = self.held.take()?;
                tracing::trace!("flushing held text at end of generation");
                Some(Ok(self.emit(held)))
            }
        }
    }
}

impl FusedIterator for DecodeStream {}

/// Byte length of the longest common prefix of `a` and `b`, on a char boundary.
fn common_prefix_len(a: &str, b: &str) -> usize {
    if b.starts_with(a) {
        return a.len();
    }
    a.char_indices()
        .zip(b.chars())
        .take_while(|((_, x), y)| x == y)
        .last()
        .map_or(0, |((index, ch), _)| index + ch.len_utf8())
}
