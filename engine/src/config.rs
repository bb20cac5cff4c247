use serde::Deserialize;
use std::{env, path::Path, path::PathBuf};

use parlor_context::DEFAULT_MEMORY_MESSAGES;
use parlor_types::{SamplingParams, TokenCap, TokenCapError};
use thiserror::Error;

pub const DEFAULT_GREETING: &str = "How can I help you?";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a wise AI assistant trained on a broad body of \
human knowledge. Answer with the final answer directly, without special tags or markers. Keep \
answers concise and focused on the question. Important: do not repeat earlier content, and do \
not repeat the same paragraphs or sentences.";

/// Registry file used when neither the CLI, the environment nor the config
/// file names one.
pub const DEFAULT_MODELS_FILE: &str = "models.txt";

/// Environment variable overriding `app.models_file`.
pub const MODELS_FILE_ENV: &str = "PARLOR_MODELS";

#[derive(Debug, Default, Deserialize)]
pub struct ParlorConfig {
    pub app: Option<AppConfig>,
    pub chat: Option<ChatConfig>,
    pub sampling: Option<SamplingConfig>,
    pub ui: Option<UiConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid chat.max_tokens: {0}")]
    TokenCap(#[from] TokenCapError),
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    /// Path to the model registry. `${VAR}` references are expanded.
    pub models_file: Option<String>,
    /// Registry label selected at startup.
    pub default_model: Option<String>,
}

/// ```toml
/// [chat]
/// greeting = "How can I help you?"
/// system_prompt = "Answer briefly."
/// max_tokens = 2048
/// memory_messages = 5
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct ChatConfig {
    pub greeting: Option<String>,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub memory_messages: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UiConfig {
    /// Use ASCII-only glyphs for icons and the streaming cursor.
    #[serde(default)]
    pub ascii_only: bool,
    /// Enable a high-contrast color palette.
    #[serde(default)]
    pub high_contrast: bool,
}

/// Sampler knobs; anything unset keeps the recommended default.
#[derive(Debug, Default, Deserialize)]
pub struct SamplingConfig {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<usize>,
    pub min_p: Option<f64>,
    pub seed: Option<u64>,
}

impl SamplingConfig {
    fn resolve(&self) -> SamplingParams {
        let defaults = SamplingParams::default();
        SamplingParams {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            min_p: self.min_p.unwrap_or(defaults.min_p),
            seed: self.seed.unwrap_or(defaults.seed),
        }
    }
}

/// Resolved per-session chat settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub greeting: String,
    pub system_prompt: String,
    pub token_cap: TokenCap,
    pub sampling: SamplingParams,
    pub memory_messages: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            token_cap: TokenCap::default(),
            sampling: SamplingParams::default(),
            memory_messages: DEFAULT_MEMORY_MESSAGES,
        }
    }
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

impl ParlorConfig {
    /// Load `~/.parlor/config.toml`; `Ok(None)` when there is no such file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path).map(Some),
            _ => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Registry path from the environment or the config file.
    ///
    /// The CLI flag, when given, takes precedence over this.
    #[must_use]
    pub fn models_file(&self) -> Option<PathBuf> {
        if let Ok(value) = env::var(MODELS_FILE_ENV)
            && !value.trim().is_empty()
        {
            return Some(PathBuf::from(value));
        }
        self.app
            .as_ref()
            .and_then(|app| app.models_file.as_deref())
            .map(|raw| PathBuf::from(expand_env_vars(raw)))
    }

    #[must_use]
    pub fn default_model(&self) -> Option<&str> {
        self.app
            .as_ref()
            .and_then(|app| app.default_model.as_deref())
    }

    pub fn chat_settings(&self) -> Result<ChatSettings, ConfigError> {
        let defaults = ChatSettings::default();
        let chat = self.chat.as_ref();
        let token_cap = match chat.and_then(|c| c.max_tokens) {
            Some(value) => TokenCap::new(value)?,
            None => defaults.token_cap,
        };
        Ok(ChatSettings {
            greeting: chat
                .and_then(|c| c.greeting.clone())
                .unwrap_or(defaults.greeting),
            system_prompt: chat
                .and_then(|c| c.system_prompt.clone())
                .unwrap_or(defaults.system_prompt),
            token_cap,
            sampling: self
                .sampling
                .as_ref()
                .map(SamplingConfig::resolve)
                .unwrap_or(defaults.sampling),
            memory_messages: chat
                .and_then(|c| c.memory_messages)
                .unwrap_or(defaults.memory_messages),
        })
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".parlor").join("config.toml"))
}
