//! Per-user session state.
//!
//! The session is the explicit context every UI action receives by `&mut`:
//! it owns the history, settings, model registry and model cache, and tracks
//! whether a turn is streaming.

use std::sync::Arc;

use parlor_context::{ConversationHistory, RemovedMessage};
use parlor_providers::{LocalModel, ModelCache, ModelEntry, ModelError, ModelRegistry};
use parlor_types::{Message, TokenCap};
use thiserror::Error;

use crate::config::ChatSettings;
use crate::continuation::ContinuationPlan;
use crate::decode::DecodeStream;
use crate::prompt::{continuation_prompt, fresh_prompt};
use crate::turn::{CompletedTurn, Turn, TurnError, TurnKind, TurnProgress, TurnRequest};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown model `{0}`")]
    UnknownModel(String),
    #[error("the selected model does not accept a system prompt")]
    SystemRoleUnsupported,
    #[error("a reply is still streaming")]
    Busy,
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Streaming,
}

struct SelectedModel {
    entry: ModelEntry,
    model: Arc<dyn LocalModel>,
}

pub struct Session {
    history: ConversationHistory,
    settings: ChatSettings,
    registry: ModelRegistry,
    cache: ModelCache,
    selected: Option<SelectedModel>,
    phase: TurnPhase,
}

impl Session {
    #[must_use]
    pub fn new(settings: ChatSettings, registry: ModelRegistry, cache: ModelCache) -> Self {
        Self {
            history: ConversationHistory::new(settings.greeting.clone()),
            settings,
            registry,
            cache,
            selected: None,
            phase: TurnPhase::Idle,
        }
    }

    #[must_use]
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    #[must_use]
    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    #[must_use]
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Label of the selected model, if any.
    #[must_use]
    pub fn model_label(&self) -> Option<&str> {
        self.selected.as_ref().map(|s| s.entry.label())
    }

    /// False when no model is selected or its template rejects system messages.
    #[must_use]
    pub fn supports_system_role(&self) -> bool {
        self.selected
            .as_ref()
            .is_some_and(|s| s.model.supports_system_role())
    }

    /// Select a model by registry label, loading it on first use.
    ///
    /// Selecting a placeholder entry leaves no model selected. A failed load
    /// keeps the previous selection.
    pub fn select_model(&mut self, label: &str) -> Result<Option<&str>, SessionError> {
        self.ensure_idle().map_err(|_| SessionError::Busy)?;
        let entry = self
            .registry
            .get(label)
            .cloned()
            .ok_or_else(|| SessionError::UnknownModel(label.to_string()))?;

        if entry.is_placeholder() {
            tracing::info!(label, "placeholder selected, no model active");
            self.selected = None;
            return Ok(None);
        }

        let model = self.cache.get_or_load(entry.reference())?;
        tracing::info!(
            label,
            reference = entry.reference(),
            system_role = model.supports_system_role(),
            "model selected"
        );
        self.selected = Some(SelectedModel { entry, model });
        Ok(self.model_label())
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) -> Result<(), SessionError> {
        if self.selected.is_some() && !self.supports_system_role() {
            return Err(SessionError::SystemRoleUnsupported);
        }
        self.settings.system_prompt = prompt.into();
        Ok(())
    }

    pub fn set_token_cap(&mut self, cap: TokenCap) {
        self.settings.token_cap = cap;
    }

    /// Reset the conversation to the greeting.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.ensure_idle().map_err(|_| SessionError::Busy)?;
        self.history.clear();
        tracing::info!("conversation cleared");
        Ok(())
    }

    /// Append a question and render the prompt answering it.
    ///
    /// On failure the history is left unchanged.
    pub fn submit(&mut self, prompt: &str) -> Result<TurnRequest, TurnError> {
        self.ensure_idle()?;
        let model = self.model()?;
        let question = Message::try_user(prompt).map_err(|_| TurnError::EmptyPrompt)?;

        self.history.append(question.clone());
        let memory = self.history.memory_window(self.settings.memory_messages);
        match fresh_prompt(model.as_ref(), &self.settings.system_prompt, memory, &question) {
            Ok(rendered) => Ok(TurnRequest::fresh(rendered)),
            Err(err) => {
                self.history.pop_pending_user();
                Err(err.into())
            }
        }
    }

    /// Prepare a continuation of the last reply.
    ///
    /// Returns `Ok(None)` when there is nothing to continue. Otherwise the
    /// old reply is removed from history; the request remembers it so a
    /// failed continuation can put it back.
    pub fn prepare_continuation(&mut self) -> Result<Option<TurnRequest>, TurnError> {
        self.ensure_idle()?;
        let model = self.model()?;
        let Some(plan) = ContinuationPlan::from_history(&self.history) else {
            tracing::debug!("nothing to continue");
            return Ok(None);
        };

        let rendered = continuation_prompt(
            model.as_ref(),
            &self.settings.system_prompt,
            &plan.question,
            &plan.partial,
        )?;
        let replaced = self.history.take_last_reply();
        Ok(Some(TurnRequest::continuation(rendered, plan.partial, replaced)))
    }

    /// Start streaming a reply for `request`.
    pub fn begin_turn(&mut self, request: TurnRequest) -> Result<Turn, TurnError> {
        self.ensure_idle()?;
        let (prompt, seed, kind, replaced) = request.into_parts();
        let stream = match self.model() {
            Ok(model) => DecodeStream::new(
                model,
                &prompt,
                self.settings.token_cap,
                &self.settings.sampling,
            ),
            Err(err) => {
                self.roll_back(kind, replaced);
                return Err(err);
            }
        };
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                self.roll_back(kind, replaced);
                return Err(err.into());
            }
        };
        self.phase = TurnPhase::Streaming;
        tracing::info!(?kind, cap = self.settings.token_cap.get(), "turn started");
        Ok(Turn::new(seed, kind, stream, replaced))
    }

    /// Store a finished reply and return to idle.
    pub fn commit(&mut self, completed: CompletedTurn) -> &Message {
        self.phase = TurnPhase::Idle;
        self.history.append(completed.into_message());
        let len = self.history.len();
        tracing::info!(messages = len, "turn committed");
        &self.history.messages()[len - 1]
    }

    /// Discard a failed turn, returning the history to its last committed
    /// state.
    pub fn abort_turn(&mut self, turn: Turn) {
        let kind = turn.kind();
        self.roll_back(kind, turn.into_replaced());
        self.phase = TurnPhase::Idle;
    }

    /// Drive a request to completion, reporting each partial display.
    pub fn run_turn<F>(
        &mut self,
        request: TurnRequest,
        mut on_partial: F,
    ) -> Result<&Message, TurnError>
    where
        F: FnMut(&str),
    {
        let mut turn = self.begin_turn(request)?;
        loop {
            match turn.advance() {
                Ok(TurnProgress::Partial(display)) => on_partial(&display),
                Ok(TurnProgress::Done) => break,
                Err(err) => {
                    self.abort_turn(turn);
                    return Err(err);
                }
            }
        }
        Ok(self.commit(turn.finish()))
    }

    fn roll_back(&mut self, kind: TurnKind, replaced: Option<RemovedMessage>) {
        match kind {
            TurnKind::Fresh => {
                if let Some(question) = self.history.pop_pending_user() {
                    tracing::info!(chars = question.content().len(), "rolled back question");
                }
            }
            TurnKind::Continuation => {
                if let Some(removed) = replaced {
                    tracing::info!(index = removed.index(), "restored previous reply");
                    self.history.restore(removed);
                }
            }
        }
    }

    fn ensure_idle(&self) -> Result<(), TurnError> {
        match self.phase {
            TurnPhase::Idle => Ok(()),
            TurnPhase::Streaming => Err(TurnError::Busy),
        }
    }

    fn model(&self) -> Result<Arc<dyn LocalModel>, TurnError> {
        self.selected
            .as_ref()
            .map(|s| Arc::clone(&s.model))
            .ok_or(TurnError::NoModel)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("messages", &self.history.len())
            .field("model", &self.model_label())
            .field("phase", &self.phase)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
