//! Conversation history and memory window management
//!
//! This crate provides:
//! - The session's message log with its greeting invariant
//! - Bounded memory window selection for prompt assembly
//! - Destructive edits used by clear and continue
//!
//! # Architecture
//!
//! ```text
//! ConversationHistory
//! ├── greeting: String        (index 0, never counted as an exchange)
//! └── messages: Vec<Message>  (append-only except explicit removal)
//! ```

mod history;

pub use history::{ConversationHistory, DEFAULT_MEMORY_MESSAGES, RemovedMessage};
