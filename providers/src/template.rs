//! Chat template rendering.
//!
//! Models ship a Jinja chat template in `tokenizer_config.json`. Templates are
//! rendered with minijinja using the Hugging Face variable contract:
//! `messages`, `add_generation_prompt`, `bos_token` and `eos_token`, plus the
//! `raise_exception` helper many templates call to reject unsupported input.

use std::path::Path;
use std::sync::Arc;

use parlor_types::ChatEntry;
use serde::Deserialize;

use crate::ModelError;

/// ChatML, used when a model carries no template of its own.
pub const DEFAULT_CHAT_TEMPLATE: &str = "{% for message in messages %}\
{{ '<|im_start|>' ~ message['role'] ~ '\\n' ~ message['content'] ~ '<|im_end|>\\n' }}\
{% endfor %}\
{% if add_generation_prompt %}{{ '<|im_start|>assistant\\n' }}{% endif %}";

/// Phrase templates use to reject system messages.
const SYSTEM_ROLE_UNSUPPORTED: &str = "system role not supported";

pub struct ChatTemplate {
    env: minijinja::Environment<'static>,
    source: Arc<str>,
    bos_token: Option<String>,
    eos_token: Option<String>,
}

impl ChatTemplate {
    #[must_use]
    pub fn new(source: &str) -> Self {
        let mut env = minijinja::Environment::new();
        env.set_keep_trailing_newline(true);
        env.add_function("raise_exception", raise_exception);
        Self {
            env,
            source: Arc::from(source),
            bos_token: None,
            eos_token: None,
        }
    }

    #[must_use]
    pub fn chatml() -> Self {
        Self::new(DEFAULT_CHAT_TEMPLATE)
    }

    #[must_use]
    pub fn with_special_tokens(mut self, bos: Option<String>, eos: Option<String>) -> Self {
        self.bos_token = bos;
        self.eos_token = eos;
        self
    }

    /// False when the template text declares system messages unsupported.
    #[must_use]
    pub fn supports_system_role(&self) -> bool {
        !self
            .source
            .to_ascii_lowercase()
            .contains(SYSTEM_ROLE_UNSUPPORTED)
    }

    pub fn render(
        &self,
        entries: &[ChatEntry],
        add_generation_prompt: bool,
    ) -> Result<String, ModelError> {
        let ctx = minijinja::context! {
            messages => entries,
            bos_token => self.bos_token.as_deref().unwrap_or_default(),
            eos_token => self.eos_token.as_deref().unwrap_or_default(),
            add_generation_prompt => add_generation_prompt,
        };
        Ok(self.env.render_str(&self.source, ctx)?)
    }
}

impl Default for ChatTemplate {
    fn default() -> Self {
        Self::chatml()
    }
}

impl Clone for ChatTemplate {
    fn clone(&self) -> Self {
        Self::new(&self.source).with_special_tokens(self.bos_token.clone(), self.eos_token.clone())
    }
}

impl std::fmt::Debug for ChatTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatTemplate")
            .field("source", &self.source)
            .field("bos_token", &self.bos_token)
            .field("eos_token", &self.eos_token)
            .finish()
    }
}

fn raise_exception(message: String) -> Result<minijinja::Value, minijinja::Error> {
    Err(minijinja::Error::new(
        minijinja::ErrorKind::InvalidOperation,
        message,
    ))
}

/// The parts of `tokenizer_config.json` that matter for prompting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizerConfig {
    pub chat_template: Option<String>,
    pub bos_token: Option<String>,
    pub eos_token: Option<String>,
}

#[derive(Deserialize)]
struct RawTokenizerConfig {
    #[serde(default)]
    chat_template: Option<RawTemplate>,
    #[serde(default)]
    bos_token: Option<RawToken>,
    #[serde(default)]
    eos_token: Option<RawToken>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTemplate {
    Single(String),
    Named(Vec<NamedTemplate>),
}

#[derive(Deserialize)]
struct NamedTemplate {
    name: String,
    template: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawToken {
    Plain(String),
    Added { content: String },
}

impl RawToken {
    fn into_content(self) -> String {
        match self {
            RawToken::Plain(content) | RawToken::Added { content } => content,
        }
    }
}

impl TokenizerConfig {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let raw: RawTokenizerConfig = serde_json::from_str(json)
            .map_err(|e| ModelError::Tokenizer(format!("invalid tokenizer_config.json: {e}")))?;

        let chat_template = raw.chat_template.and_then(|template| match template {
            RawTemplate::Single(source) => Some(source),
            RawTemplate::Named(mut named) => {
                let index = named.iter().position(|t| t.name == "default").unwrap_or(0);
                (!named.is_empty()).then(|| named.swap_remove(index).template)
            }
        });

        Ok(Self {
            chat_template,
            bos_token: raw.bos_token.map(RawToken::into_content),
            eos_token: raw.eos_token.map(RawToken::into_content),
        })
    }

    /// Read the config next to a model; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no tokenizer config, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ModelError::Tokenizer(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Build the template, falling back to ChatML when none is configured.
    #[must_use]
    pub fn into_template(self) -> ChatTemplate {
        let template = match self.chat_template {
            Some(source) => ChatTemplate::new(&source),
            None => {
                tracing::info!("tokenizer has no chat template, using ChatML");
                ChatTemplate::chatml()
            }
        };
        template.with_special_tokens(self.bos_token, self.eos_token)
    }
}
