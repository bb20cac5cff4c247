//! Conversation message domain model.
//!
//! A message is a role tag plus text. Unlike provider-facing message formats
//! there are no tool calls or thinking blocks here: the local model sees one
//! flattened prompt, so the transcript only needs to remember who said what.

use serde::{Deserialize, Serialize};

use crate::{EmptyStringError, NonEmptyString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed transcript entry.
///
/// Assistant content may be empty: a reply that sanitizes down to nothing is
/// still committed so every question keeps exactly one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// User messages always carry text; see [`Message::try_user`] for raw input.
    #[must_use]
    pub fn user(content: NonEmptyString) -> Self {
        Self::new(Role::User, content.into_inner())
    }

    pub fn try_user(content: impl Into<String>) -> Result<Self, EmptyStringError> {
        Ok(Self::user(NonEmptyString::new(content)?))
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn role_str(&self) -> &'static str {
        self.role.as_str()
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    #[must_use]
    pub fn to_entry(&self) -> ChatEntry {
        ChatEntry::new(self.role, self.content.clone())
    }
}

/// Role-tagged text handed to a chat template.
///
/// Serializes to `{"role": "...", "content": "..."}`, the shape Hugging Face
/// style templates iterate over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: Role,
    pub content: String,
}

impl ChatEntry {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatEntry {
    fn from(message: &Message) -> Self {
        message.to_entry()
    }
}
