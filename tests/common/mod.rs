//! Shared test utilities and fixtures
//!
//! A byte-level model double: every sampled token is one scripted byte
//! string, and decoding concatenates the bytes and decodes them lossily, the
//! way a real byte-fallback tokenizer renders a split multi-byte character.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use parlor_engine::{
    ChatSettings, ModelCache, ModelError, ModelRegistry, SamplingParams, Session,
};
use parlor_providers::{
    ChatModel, ChatTemplate, LocalModel, ModelLoader, SampledToken, TokenId, TokenSampler,
    TokenStream,
};
use parlor_types::ChatEntry;

pub const GREETING: &str = "How can I help you?";
pub const SYSTEM_PROMPT: &str = "Be brief.";
pub const MODEL_LABEL: &str = "Scripted";

pub const REGISTRY: &str = "\
# label | reference
Pick a model | -
Scripted | test/scripted
";

enum Step {
    Bytes(Vec<u8>),
    Fail,
}

pub struct ScriptedModel {
    template: ChatTemplate,
    vocab: Mutex<Vec<Vec<u8>>>,
    replies: Mutex<VecDeque<Vec<Step>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(template: ChatTemplate) -> Arc<Self> {
        Arc::new(Self {
            template,
            vocab: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn chatml() -> Arc<Self> {
        Self::new(ChatTemplate::chatml())
    }

    /// Queue a reply, one token per piece.
    pub fn reply(&self, pieces: &[&str]) {
        self.push(
            pieces
                .iter()
                .map(|piece| Step::Bytes(piece.as_bytes().to_vec()))
                .collect(),
        );
    }

    /// Queue a reply given as raw byte tokens.
    pub fn reply_bytes(&self, tokens: &[&[u8]]) {
        self.push(tokens.iter().map(|bytes| Step::Bytes(bytes.to_vec())).collect());
    }

    /// Queue a reply that yields `pieces` and then fails.
    pub fn reply_then_fail(&self, pieces: &[&str]) {
        let mut steps: Vec<Step> = pieces
            .iter()
            .map(|piece| Step::Bytes(piece.as_bytes().to_vec()))
            .collect();
        steps.push(Step::Fail);
        self.push(steps);
    }

    fn push(&self, steps: Vec<Step>) {
        self.replies.lock().unwrap().push_back(steps);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts().pop().unwrap_or_default()
    }
}

impl ChatModel for ScriptedModel {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, ModelError> {
        self.prompts.lock().unwrap().push(text.to_string());
        Ok(vec![0; text.len().max(1)])
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, ModelError> {
        let vocab = self.vocab.lock().unwrap();
        let bytes: Vec<u8> = tokens
            .iter()
            .flat_map(|token| vocab[*token as usize].iter().copied())
            .collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn render_chat(&self, entries: &[ChatEntry], add: bool) -> Result<String, ModelError> {
        self.template.render(entries, add)
    }

    fn supports_system_role(&self) -> bool {
        self.template.supports_system_role()
    }
}

impl TokenSampler for ScriptedModel {
    fn sample(
        &self,
        _prompt: &[TokenId],
        _params: &SamplingParams,
    ) -> Result<TokenStream, ModelError> {
        let steps = self.replies.lock().unwrap().pop_front().unwrap_or_default();
        let mut vocab = self.vocab.lock().unwrap();
        let items: Vec<Result<SampledToken, ModelError>> = steps
            .into_iter()
            .map(|step| match step {
                Step::Bytes(bytes) => {
                    vocab.push(bytes);
                    Ok(SampledToken::new((vocab.len() - 1) as TokenId, 0.5))
                }
                Step::Fail => Err(ModelError::Sampling("scripted failure".into())),
            })
            .collect();
        Ok(Box::new(items.into_iter()))
    }
}

struct SharedLoader(Arc<ScriptedModel>);

impl ModelLoader for SharedLoader {
    fn load(&self, reference: &str) -> Result<Arc<dyn LocalModel>, ModelError> {
        match reference {
            "test/scripted" => Ok(Arc::clone(&self.0) as Arc<dyn LocalModel>),
            other => Err(ModelError::load(other, "not in test registry")),
        }
    }
}

pub fn settings() -> ChatSettings {
    ChatSettings {
        greeting: GREETING.to_string(),
        system_prompt: SYSTEM_PROMPT.to_string(),
        ..ChatSettings::default()
    }
}

/// A session with `model` selected.
pub fn session(model: &Arc<ScriptedModel>) -> Session {
    let registry = ModelRegistry::parse(REGISTRY).unwrap();
    let cache = ModelCache::new(Box::new(SharedLoader(Arc::clone(model))));
    let mut session = Session::new(settings(), registry, cache);
    session.select_model(MODEL_LABEL).unwrap();
    session
}

/// Submit `prompt` and stream the reply to completion.
pub fn ask(session: &mut Session, prompt: &str) -> String {
    let request = session.submit(prompt).unwrap();
    session
        .run_turn(request, |_| {})
        .unwrap()
        .content()
        .to_string()
}

/// Continue the last reply to completion.
pub fn continue_reply(session: &mut Session) -> String {
    let request = session
        .prepare_continuation()
        .unwrap()
        .expect("there is a reply to continue");
    session
        .run_turn(request, |_| {})
        .unwrap()
        .content()
        .to_string()
}

pub fn transcript(session: &Session) -> Vec<String> {
    session
        .history()
        .messages()
        .iter()
        .map(|message| format!("{}: {}", message.role_str(), message.content()))
        .collect()
}
