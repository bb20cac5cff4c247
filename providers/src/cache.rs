//! Loaded-model cache.
//!
//! Each reference is loaded at most once per process and kept for the rest of
//! its lifetime. There is no eviction: a chat session cycles through a handful
//! of models and reloading one costs far more than holding it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{LocalModel, ModelError, ModelLoader};

pub struct ModelCache {
    loader: Box<dyn ModelLoader>,
    models: HashMap<String, Arc<dyn LocalModel>>,
}

impl ModelCache {
    pub fn new(loader: Box<dyn ModelLoader>) -> Self {
        Self {
            loader,
            models: HashMap::new(),
        }
    }

    /// Return the cached model for `reference`, loading it on first use.
    ///
    /// A failed load caches nothing, so a later call retries.
    pub fn get_or_load(&mut self, reference: &str) -> Result<Arc<dyn LocalModel>, ModelError> {
        if let Some(model) = self.models.get(reference) {
            tracing::debug!(reference, "model cache hit");
            return Ok(Arc::clone(model));
        }

        tracing::info!(reference, "loading model");
        let model = self.loader.load(reference)?;
        self.models.insert(reference.to_string(), Arc::clone(&model));
        Ok(model)
    }

    #[must_use]
    pub fn contains(&self, reference: &str) -> bool {
        self.models.contains_key(reference)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut loaded: Vec<_> = self.models.keys().collect();
        loaded.sort();
        f.debug_struct("ModelCache").field("loaded", &loaded).finish()
    }
}
