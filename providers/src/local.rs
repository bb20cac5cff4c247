//! Candle GGUF backend.
//!
//! Only compiled with the `local-ml` feature. A reference resolves to either
//! a local directory (or `.gguf` file) or a Hugging Face repository id; in both
//! cases the model needs quantized weights, `tokenizer.json`, and optionally
//! `tokenizer_config.json` for the chat template and special tokens.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::quantized_llama::ModelWeights;
use parlor_types::{ChatEntry, SamplingParams};
use tokenizers::Tokenizer;

use crate::{
    ChatModel, ChatTemplate, LocalModel, ModelError, ModelLoader, ModelSource, SampledToken,
    TokenId, TokenSampler, TokenStream, TokenizerConfig, resolve_reference,
};

const TOKENIZER_FILE: &str = "tokenizer.json";
const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";
const EOS_METADATA_KEY: &str = "tokenizer.ggml.eos_token_id";

/// Loads GGUF models from disk or the Hugging Face hub.
#[derive(Debug, Clone)]
pub struct HfModelLoader {
    device: Device,
}

impl HfModelLoader {
    #[must_use]
    pub fn new(device: Device) -> Self {
        Self { device }
    }

    #[must_use]
    pub fn cpu() -> Self {
        Self::new(Device::Cpu)
    }
}

impl ModelLoader for HfModelLoader {
    fn load(&self, reference: &str) -> Result<Arc<dyn LocalModel>, ModelError> {
        let files = match resolve_reference(reference) {
            ModelSource::Local(path) => ModelFiles::from_local(reference, &path)?,
            ModelSource::Hub(repo_id) => ModelFiles::from_hub(&repo_id)?,
        };
        let model = GgufModel::load(reference, &files, &self.device)?;
        Ok(Arc::new(model))
    }
}

#[derive(Debug)]
struct ModelFiles {
    weights: PathBuf,
    tokenizer: PathBuf,
    tokenizer_config: Option<PathBuf>,
}

impl ModelFiles {
    fn from_local(reference: &str, path: &Path) -> Result<Self, ModelError> {
        let (dir, weights) = if path.is_file() {
            let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
            (dir, path.to_path_buf())
        } else {
            let weights = find_gguf(path)
                .map_err(|e| ModelError::load(reference, e))?
                .ok_or_else(|| {
                    ModelError::load(reference, format!("no .gguf file in {}", path.display()))
                })?;
            (path.to_path_buf(), weights)
        };

        let tokenizer = dir.join(TOKENIZER_FILE);
        if !tokenizer.is_file() {
            return Err(ModelError::load(
                reference,
                format!("missing {}", tokenizer.display()),
            ));
        }
        let config = dir.join(TOKENIZER_CONFIG_FILE);
        Ok(Self {
            weights,
            tokenizer,
            tokenizer_config: config.is_file().then_some(config),
        })
    }

    fn from_hub(repo_id: &str) -> Result<Self, ModelError> {
        let api = hf_hub::api::sync::Api::new().map_err(|e| ModelError::load(repo_id, e))?;
        let repo = api.model(repo_id.to_string());
        let info = repo.info().map_err(|e| ModelError::load(repo_id, e))?;

        let mut ggufs: Vec<&str> = info
            .siblings
            .iter()
            .map(|s| s.rfilename.as_str())
            .filter(|name| name.ends_with(".gguf"))
            .collect();
        ggufs.sort_unstable();
        let weights_name = ggufs
            .first()
            .ok_or_else(|| ModelError::load(repo_id, "repository has no .gguf file"))?;
        tracing::info!(repo_id, file = weights_name, "fetching model weights");

        let weights = repo
            .get(weights_name)
            .map_err(|e| ModelError::load(repo_id, e))?;
        let tokenizer = repo
            .get(TOKENIZER_FILE)
            .map_err(|e| ModelError::load(repo_id, e))?;
        let tokenizer_config = repo.get(TOKENIZER_CONFIG_FILE).ok();
        Ok(Self {
            weights,
            tokenizer,
            tokenizer_config,
        })
    }
}

fn find_gguf(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "gguf"))
        .collect();
    found.sort();
    Ok(found.into_iter().next())
}

/// Quantized llama-family model with its tokenizer and chat template.
pub struct GgufModel {
    weights: Arc<Mutex<ModelWeights>>,
    tokenizer: Tokenizer,
    template: ChatTemplate,
    device: Device,
    eos_token_id: Option<TokenId>,
}

impl GgufModel {
    fn load(reference: &str, files: &ModelFiles, device: &Device) -> Result<Self, ModelError> {
        let mut file =
            std::fs::File::open(&files.weights).map_err(|e| ModelError::load(reference, e))?;
        let content =
            gguf_file::Content::read(&mut file).map_err(|e| ModelError::load(reference, e))?;
        let metadata_eos = content
            .metadata
            .get(EOS_METADATA_KEY)
            .and_then(|value| value.to_u32().ok());
        let weights = ModelWeights::from_gguf(content, &mut file, device)
            .map_err(|e| ModelError::load(reference, e))?;

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| ModelError::load(reference, format!("failed to load tokenizer: {e}")))?;

        let config = match &files.tokenizer_config {
            Some(path) => TokenizerConfig::load(path)?,
            None => TokenizerConfig::default(),
        };
        let eos_token_id = config
            .eos_token
            .as_deref()
            .and_then(|token| tokenizer.token_to_id(token))
            .or(metadata_eos);
        let template = config.into_template();

        tracing::info!(
            reference,
            weights = %files.weights.display(),
            eos = ?eos_token_id,
            system_role = template.supports_system_role(),
            "model loaded"
        );

        Ok(Self {
            weights: Arc::new(Mutex::new(weights)),
            tokenizer,
            template,
            device: device.clone(),
            eos_token_id,
        })
    }
}

impl ChatModel for GgufModel {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, ModelError> {
        // The rendered template already carries any BOS the model expects.
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| ModelError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, ModelError> {
        self.tokenizer
            .decode(tokens, false)
            .map_err(|e| ModelError::Decode(e.to_string()))
    }

    fn render_chat(
        &self,
        entries: &[ChatEntry],
        add_generation_prompt: bool,
    ) -> Result<String, ModelError> {
        self.template.render(entries, add_generation_prompt)
    }

    fn supports_system_role(&self) -> bool {
        self.template.supports_system_role()
    }
}

impl TokenSampler for GgufModel {
    fn sample(
        &self,
        prompt: &[TokenId],
        params: &SamplingParams,
    ) -> Result<TokenStream, ModelError> {
        if prompt.is_empty() {
            return Err(ModelError::Sampling("prompt encoded to no tokens".into()));
        }
        if params.min_p > 0.0 {
            tracing::debug!(min_p = params.min_p, "min_p is not supported by this backend");
        }
        Ok(Box::new(GgufTokenStream {
            weights: Arc::clone(&self.weights),
            device: self.device.clone(),
            processor: LogitsProcessor::from_sampling(params.seed, sampling_for(params)),
            input: prompt.to_vec(),
            position: 0,
            eos_token_id: self.eos_token_id,
            finished: false,
        }))
    }
}

fn sampling_for(params: &SamplingParams) -> Sampling {
    if params.is_greedy() {
        return Sampling::ArgMax;
    }
    let temperature = params.temperature;
    let nucleus = params.top_p > 0.0 && params.top_p < 1.0;
    match (params.top_k, nucleus) {
        (0, false) => Sampling::All { temperature },
        (0, true) => Sampling::TopP {
            p: params.top_p,
            temperature,
        },
        (k, false) => Sampling::TopK { k, temperature },
        (k, true) => Sampling::TopKThenTopP {
            k,
            p: params.top_p,
            temperature,
        },
    }
}

/// Autoregressive generation as a pull iterator.
///
/// The first step feeds the whole prompt at position 0, which also resets the
/// model's KV cache; later steps feed only the previously sampled token. The
/// stream ends after yielding the end-of-sequence token.
struct GgufTokenStream {
    weights: Arc<Mutex<ModelWeights>>,
    device: Device,
    processor: LogitsProcessor,
    input: Vec<TokenId>,
    position: usize,
    eos_token_id: Option<TokenId>,
    finished: bool,
}

impl GgufTokenStream {
    fn step(&mut self) -> Result<SampledToken, ModelError> {
        let input = Tensor::new(self.input.as_slice(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(sampling_error)?;
        let logits = {
            let mut weights = self
                .weights
                .lock()
                .map_err(|_| ModelError::Sampling("model weights lock poisoned".into()))?;
            weights
                .forward(&input, self.position)
                .map_err(sampling_error)?
        };

        let mut logits = logits
            .squeeze(0)
            .and_then(|t| t.to_dtype(DType::F32))
            .map_err(sampling_error)?;
        if logits.rank() == 2 {
            let rows = logits.dim(0).map_err(sampling_error)?;
            logits = logits
                .narrow(0, rows - 1, 1)
                .and_then(|t| t.squeeze(0))
                .map_err(sampling_error)?;
        }

        let id = self.processor.sample(&logits).map_err(sampling_error)?;
        let probability = token_probability(&logits, id)?;

        self.position += self.input.len();
        self.input.clear();
        self.input.push(id);
        Ok(SampledToken::new(id, probability))
    }
}

impl Iterator for GgufTokenStream {
    type Item = Result<SampledToken, ModelError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.step();
        match &result {
            Ok(token) => self.finished = Some(token.id) == self.eos_token_id,
            Err(_) => self.finished = true,
        }
        Some(result)
    }
}

fn token_probability(logits: &Tensor, id: TokenId) -> Result<f32, ModelError> {
    let values: Vec<f32> = logits.to_vec1().map_err(sampling_error)?;
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let total: f32 = values.iter().map(|v| (v - max).exp()).sum();
    let chosen = values.get(id as usize).copied().unwrap_or(f32::NEG_INFINITY);
    Ok((chosen - max).exp() / total)
}

fn sampling_error(err: candle_core::Error) -> ModelError {
    ModelError::Sampling(err.to_string())
}
