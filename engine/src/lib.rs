//! Core engine for Parlor - session and turn control.
//!
//! This crate owns everything between a key press and a committed reply,
//! without TUI dependencies:
//!
//! - [`prompt`] renders history into a single prompt through the model's template
//! - [`DecodeStream`] turns sampled tokens into text deltas, bounded by the token cap
//! - [`Turn`] accumulates and sanitizes deltas while a reply streams
//! - [`continuation`] resumes a reply that stopped too early
//! - [`Session`] ties these to the history, settings and loaded models

mod config;
pub mod continuation;
mod decode;
pub mod prompt;
mod session;
mod turn;

pub use config::{
    AppConfig, ChatConfig, ChatSettings, ConfigError, DEFAULT_GREETING, DEFAULT_MODELS_FILE,
    DEFAULT_SYSTEM_PROMPT, MODELS_FILE_ENV, ParlorConfig, SamplingConfig, UiConfig, config_path,
    expand_env_vars,
};
pub use decode::DecodeStream;
pub use session::{Session, SessionError, TurnPhase};
pub use turn::{
    CompletedTurn, STREAMING_CURSOR, Turn, TurnError, TurnKind, TurnProgress, TurnRequest,
};

pub use parlor_context::{ConversationHistory, RemovedMessage};
pub use parlor_providers::{
    self, ModelCache, ModelError, ModelRegistry, RegistryError, default_loader,
};
pub use parlor_types::{
    Message, NonEmptyString, Role, SamplingParams, TokenCap, unsettled_marker_start,
};
