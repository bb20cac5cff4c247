//! Prompt assembly.
//!
//! Turns conversation entries into the single linear prompt a local model
//! consumes, through the model's own chat template.

use parlor_providers::{ChatModel, ModelError};
use parlor_types::{ChatEntry, Message, Role};

/// Whether the rendered prompt should open a new assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPrompt {
    /// Fresh turn: the template appends the assistant header.
    Open,
    /// Continuation: the prompt ends inside the assistant's partial reply.
    Resume,
}

impl GenerationPrompt {
    fn add_generation_prompt(self) -> bool {
        matches!(self, GenerationPrompt::Open)
    }
}

/// Render `conversation`, led by the system directive when the model accepts
/// one, and strip trailing newlines from the result.
pub fn render_prompt<M: ChatModel + ?Sized>(
    model: &M,
    system_prompt: &str,
    conversation: &[ChatEntry],
    mode: GenerationPrompt,
) -> Result<String, ModelError> {
    let mut entries = Vec::with_capacity(conversation.len() + 1);
    if model.supports_system_role() {
        entries.push(ChatEntry::new(Role::System, system_prompt));
    }
    entries.extend_from_slice(conversation);

    let mut rendered = model.render_chat(&entries, mode.add_generation_prompt())?;
    let kept = rendered.trim_end_matches('\n').len();
    rendered.truncate(kept);

    tracing::debug!(
        entries = entries.len(),
        ?mode,
        prompt = %rendered,
        "rendered prompt"
    );
    Ok(rendered)
}

/// `[system?] + memory + [question]`, opening a new assistant turn.
pub fn fresh_prompt<M: ChatModel + ?Sized>(
    model: &M,
    system_prompt: &str,
    memory: &[Message],
    question: &Message,
) -> Result<String, ModelError> {
    let conversation: Vec<ChatEntry> = memory
        .iter()
        .chain(std::iter::once(question))
        .map(ChatEntry::from)
        .collect();
    render_prompt(model, system_prompt, &conversation, GenerationPrompt::Open)
}

/// `[system?, question, partial]`, resuming inside the partial reply.
pub fn continuation_prompt<M: ChatModel + ?Sized>(
    model: &M,
    system_prompt: &str,
    question: &Message,
    partial: &str,
) -> Result<String, ModelError> {
    let conversation = [
        ChatEntry::from(question),
        ChatEntry::new(Role::Assistant, partial),
    ];
    render_prompt(model, system_prompt, &conversation, GenerationPrompt::Resume)
}
