//! DeepSeek driver.
//!
//! Wire-compatible with the OpenAI Chat Completions format; only the
//! endpoint, model catalog and credential differ.

use super::openai::{build_chat_completions_body, parse_chat_completions_reply};
use super::{CompletionRequest, Provider, ProviderId};
use crate::error::OmaaError;
use reqwest::RequestBuilder;
use serde_json::Value;

pub struct DeepSeek;

impl Provider for DeepSeek {
    fn id(&self) -> ProviderId {
        ProviderId::DeepSeek
    }

    fn display_name(&self) -> &'static str {
        "DeepSeek"
    }

    fn endpoint(&self) -> &'static str {
        "https://api.deepseek.com/chat/completions"
    }

    fn default_model(&self) -> &'static str {
        "deepseek-chat"
    }

    fn models(&self) -> &'static [&'static str] {
        &["deepseek-chat", "deepseek-reasoner"]
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
