//! Capability traits a local model backend provides.
//!
//! The engine never sees a concrete backend: it talks to `dyn LocalModel`
//! handles obtained from a [`ModelLoader`]. Tests substitute scripted
//! implementations of the same traits.

use std::sync::Arc;

use parlor_types::{ChatEntry, SamplingParams};

use crate::ModelError;

pub type TokenId = u32;

/// One sampler output: the chosen token and its probability under the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampledToken {
    pub id: TokenId,
    pub probability: f32,
}

impl SampledToken {
    #[must_use]
    pub fn new(id: TokenId, probability: f32) -> Self {
        Self { id, probability }
    }
}

/// Lazy, possibly unbounded, sequence of sampled tokens.
///
/// The stream owns whatever handles it needs, so it can outlive the borrow of
/// the model it was created from and move between threads.
pub type TokenStream = Box<dyn Iterator<Item = Result<SampledToken, ModelError>> + Send>;

/// Tokenization and chat-template rendering.
pub trait ChatModel: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, ModelError>;

    /// Decode a full token sequence. Special tokens are kept in the output so
    /// that downstream filters can see and remove them.
    fn decode(&self, tokens: &[TokenId]) -> Result<String, ModelError>;

    fn render_chat(
        &self,
        entries: &[ChatEntry],
        add_generation_prompt: bool,
    ) -> Result<String, ModelError>;

    fn supports_system_role(&self) -> bool;
}

/// Black-box token producer.
pub trait TokenSampler: Send + Sync {
    fn sample(&self, prompt: &[TokenId], params: &SamplingParams)
    -> Result<TokenStream, ModelError>;
}

/// A loaded model able to both render prompts and generate.
pub trait LocalModel: ChatModel + TokenSampler {}

impl<T: ChatModel + TokenSampler + ?Sized> LocalModel for T {}

/// Loads a model from a registry reference.
pub trait ModelLoader: Send + Sync {
    fn load(&self, reference: &str) -> Result<Arc<dyn LocalModel>, ModelError>;
}

/// Loader used when no inference backend is compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableLoader;

impl ModelLoader for UnavailableLoader {
    fn load(&self, reference: &str) -> Result<Arc<dyn LocalModel>, ModelError> {
        Err(ModelError::load(
            reference,
            "no inference backend compiled in (rebuild with the `local-ml` feature)",
        ))
    }
}
