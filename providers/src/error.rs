use std::path::PathBuf;

use thiserror::Error;

/// Failures from loading or running a local model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to load model `{reference}`: {message}")]
    Load { reference: String, message: String },
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("chat template error: {0}")]
    Template(String),
    #[error("sampling failed: {0}")]
    Sampling(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

impl ModelError {
    pub fn load(reference: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Load {
            reference: reference.into(),
            message: message.to_string(),
        }
    }
}

impl From<minijinja::Error> for ModelError {
    fn from(err: minijinja::Error) -> Self {
        Self::Template(err.to_string())
    }
}

/// Problems with the model registry file. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read model registry {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: expected `label | reference`, got `{content}`")]
    MalformedLine { line: usize, content: String },
    #[error("line {line}: duplicate model label `{label}`")]
    DuplicateLabel { line: usize, label: String },
    #[error("model registry lists no models")]
    Empty,
}
