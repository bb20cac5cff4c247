//! Chat template and prompt assembly tests

use parlor_engine::prompt::{continuation_prompt, fresh_prompt};
use parlor_providers::{ChatTemplate, TokenizerConfig};
use parlor_types::{ChatEntry, Message, Role};

use crate::common::{SYSTEM_PROMPT, ScriptedModel};

const LLAMA_CONFIG: &str = r#"{
    "bos_token": {"content": "<|begin_of_text|>", "lstrip": false},
    "eos_token": "<|eot_id|>",
    "chat_template": "{{ bos_token }}{% for message in messages %}<|start_header_id|>{{ message['role'] }}<|end_header_id|>\n\n{{ message['content'] | trim }}<|eot_id|>{% endfor %}{% if add_generation_prompt %}<|start_header_id|>assistant<|end_header_id|>\n\n{% endif %}"
}"#;

fn llama_template() -> ChatTemplate {
    TokenizerConfig::from_json(LLAMA_CONFIG)
        .unwrap()
        .into_template()
}

#[test]
fn tokenizer_config_template_renders_with_special_tokens() {
    let rendered = llama_template()
        .render(&[ChatEntry::new(Role::User, " hi ")], true)
        .unwrap();
    assert_eq!(
        rendered,
        "<|begin_of_text|><|start_header_id|>user<|end_header_id|>\n\nhi<|eot_id|>\
         <|start_header_id|>assistant<|end_header_id|>\n\n"
    );
}

#[test]
fn fresh_prompt_strips_trailing_newlines() {
    let model = ScriptedModel::new(llama_template());
    let question = Message::try_user("hi").unwrap();
    let prompt = fresh_prompt(model.as_ref(), SYSTEM_PROMPT, &[], &question).unwrap();
    assert_eq!(
        prompt,
        "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\nBe brief.<|eot_id|>\
         <|start_header_id|>user<|end_header_id|>\n\nhi<|eot_id|>\
         <|start_header_id|>assistant<|end_header_id|>"
    );
}

#[test]
fn continuation_prompt_ends_inside_the_reply() {
    let model = ScriptedModel::chatml();
    let question = Message::try_user("list three").unwrap();
    let prompt = continuation_prompt(model.as_ref(), SYSTEM_PROMPT, &question, "1. a\n2. b").unwrap();
    assert_eq!(
        prompt,
        "<|im_start|>system\nBe brief.<|im_end|>\n\
         <|im_start|>user\nlist three<|im_end|>\n\
         <|im_start|>assistant\n1. a\n2. b<|im_end|>"
    );
}

#[test]
fn named_templates_prefer_default() {
    let config = TokenizerConfig::from_json(
        r#"{"chat_template": [
            {"name": "tool_use", "template": "tools"},
            {"name": "default", "template": "{{ messages | length }} messages"}
        ]}"#,
    )
    .unwrap();
    let rendered = config
        .into_template()
        .render(&[ChatEntry::new(Role::User, "x")], false)
        .unwrap();
    assert_eq!(rendered, "1 messages");
}

#[test]
fn missing_template_falls_back_to_chatml() {
    let template = TokenizerConfig::from_json(r#"{"eos_token": "</s>"}"#)
        .unwrap()
        .into_template();
    let rendered = template
        .render(&[ChatEntry::new(Role::User, "hi")], true)
        .unwrap();
    assert_eq!(rendered, "<|im_start|>user\nhi<|im_end|>\n<|im_start|>assistant\n");
}

#[test]
fn template_errors_surface_as_model_errors() {
    let template = ChatTemplate::new("{{ raise_exception('nope') }}");
    let err = template
        .render(&[ChatEntry::new(Role::User, "hi")], true)
        .unwrap_err();
    assert!(err.to_string().contains("nope"));
}
