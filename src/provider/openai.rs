//! OpenAI Chat Completions driver.
//!
//! The system prompt travels as a normal leading message in the array, and
//! the reply text lives at `choices[0].message.content`. DeepSeek shares this
//! wire format, so the body builder and reply parser are crate-visible.

use super::{CompletionRequest, Provider, ProviderId};
use crate::error::OmaaError;
use reqwest::RequestBuilder;
use serde_json::{json, Value};

pub struct OpenAi;

impl Provider for OpenAi {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn display_name(&self) -> &'static str {
        "OpenAI"
    }

    fn endpoint(&self) -> &'static str {
        "https://api.openai.com/v1/chat/completions"
    }

    fn default_model(&self) -> &'static str {
        "gpt-4o-mini"
    }

    fn models(&self) -> &'static [&'static str] {
        &["gpt-4o-mini", "gpt-4o", "gpt-4-turbo"]
    }

    fn build_request(&self, request: &CompletionRequest) -> Value {
        build_chat_completions_body(request)
    }

    fn parse_reply(&self, body: &Value) -> Result<String, OmaaError> {
        parse_chat_completions_reply(body)
    }

    fn apply_auth(&self, builder: RequestBuilder, api_key: &str) -> RequestBuilder {
        builder.header("Authorization", format!("Bearer {}", api_key))
    }
}

/// Build an OpenAI-compatible body: system prompt first, then the history.
pub(super) fn build_chat_completions_body(request: &CompletionRequest) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system_prompt.is_empty() {
        messages.push(json!({"role": "system", "content": request.system_prompt}));
    }
    for m in request.messages {
        messages.push(json!({"role": m.role.to_string(), "content": m.content}));
    }

    json!({
        "model": request.model,
        "messages": messages,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    })
}

/// Reply text lives at `choices[0].message.content`.
pub(super) fn parse_chat_completions_reply(body: &Value) -> Result<String, OmaaError> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            OmaaError::ParseError("missing choices[0].message.content in reply".to_string())
        })
}
