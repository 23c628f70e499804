//! Anthropic Messages API driver.
//!
//! Differs from the OpenAI shape in two ways that matter here:
//! - The system prompt is a top-level `system` field, and any system-role
//!   entries are excluded from the `messages` array.
//! - The reply text lives at `content[0].text`.

use super::{CompletionRequest, Provider, ProviderId};
use crate::error::OmaaError;
use crate::store::Role;
use reqwest::RequestBuilder;
use serde_json::{json, Value};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct Anthropic;

impl Provider for Anthropic {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn display_name(&self) -> &'static str {
        "Anthropic"
    }

    fn endpoint(&self) -> &'static str {
        "https://api.anthropic.com/v1/messages"
    }

    fn default_model(&self) -> &'static str {
        "claude-3-5-haiku-20241022"
    }

    fn models(&self) -> &'static [&'static str] {
        &[
            "claude-3-5-haiku-20241022",
            "claude-3-5-sonnet-20241022",
            "claude-3-opus-20240229",
        ]
    }

    fn build_request(&self, request: &CompletionRequest) -> Value {
        // System-role history entries fold into the top-level system field.
        let mut system_parts: Vec<&str> = Vec::new();
        if !request.system_prompt.is_empty() {
            system_parts.push(request.system_prompt);
        }

        let mut messages = Vec::with_capacity(request.messages.len());
        for m in request.messages {
            match m.role {
                Role::System => system_parts.push(&m.content),
                Role::User | Role::Assistant => {
                    messages.push(json!({"role": m.role.to_string(), "content": m.content}));
                }
            }
        }

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
            "temperature": request.temperature,
        });
        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }
        body
    }

    fn parse_reply(&self, body: &Value) -> Result<String, OmaaError> {
        body["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| OmaaError::ParseError("missing content[0].text in reply".to_string()))
    }

    fn apply_auth(&self, builder: RequestBuilder, api_key: &str) -> RequestBuilder {
        builder
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }
}
