//! Local model plumbing for Parlor.
//!
//! # Architecture
//!
//! - [`ChatModel`] / [`TokenSampler`] - capability traits the engine drives
//! - [`ModelRegistry`] - `label | reference` list read at startup
//! - [`ModelCache`] - loads each reference once through a [`ModelLoader`]
//! - [`ChatTemplate`] - minijinja rendering of Hugging Face chat templates
//! - `HfModelLoader` - candle GGUF backend (feature `local-ml`)
//!
//! Without the `local-ml` feature the binary still runs; model loads fail
//! with a [`ModelError::Load`] naming the missing feature.

mod cache;
mod error;
mod model;
mod registry;
mod template;

#[cfg(feature = "local-ml")]
mod local;

pub use cache::ModelCache;
pub use error::{ModelError, RegistryError};
#[cfg(feature = "local-ml")]
pub use local::{GgufModel, HfModelLoader};
pub use model::{
    ChatModel, LocalModel, ModelLoader, SampledToken, TokenId, TokenSampler, TokenStream,
    UnavailableLoader,
};
pub use registry::{
    ModelEntry, ModelRegistry, ModelSource, PLACEHOLDER_REFERENCE, resolve_reference,
};
pub use template::{ChatTemplate, DEFAULT_CHAT_TEMPLATE, TokenizerConfig};

pub use parlor_types;

/// The loader for the inference backend compiled into this build.
#[must_use]
pub fn default_loader() -> Box<dyn ModelLoader> {
    #[cfg(feature = "local-ml")]
    {
        Box::new(HfModelLoader::cpu())
    }
    #[cfg(not(feature = "local-ml"))]
    {
        Box::new(UnavailableLoader)
    }
}
