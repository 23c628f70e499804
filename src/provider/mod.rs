//! Multi-provider request adapter.
//!
//! Each supported LLM vendor implements the [`Provider`] strategy trait:
//! static catalog data plus request building and response parsing. The
//! [`ProviderAdapter`] resolves a provider from the lookup table, attaches the
//! configured credential and performs exactly one upstream call per
//! invocation. No retries: a failure surfaces immediately to the caller.

mod anthropic;
mod deepseek;
mod openai;

pub use anthropic::Anthropic;
pub use deepseek::DeepSeek;
pub use openai::OpenAi;

use crate::config::{ApiKeysConfig, ChatConfig};
use crate::error::OmaaError;
use crate::http::{create_client_with_timeout, COMPLETION_TIMEOUT};
use crate::store::Message;
use reqwest::RequestBuilder;
use serde::Serialize;
use serde_json::Value;

/// Provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    DeepSeek,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::DeepSeek => "deepseek",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(ProviderId::OpenAi),
            "anthropic" => Ok(ProviderId::Anthropic),
            "deepseek" => Ok(ProviderId::DeepSeek),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Inputs for building one completion request.
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub messages: &'a [Message],
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Per-provider wire format strategy.
pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;
    fn display_name(&self) -> &'static str;
    /// Full URL of the chat-completion endpoint.
    fn endpoint(&self) -> &'static str;
    fn default_model(&self) -> &'static str;
    fn models(&self) -> &'static [&'static str];
    /// Build the provider-specific request body.
    fn build_request(&self, request: &CompletionRequest) -> Value;
    /// Extract the reply text from a success response body.
    fn parse_reply(&self, body: &Value) -> Result<String, OmaaError>;
    /// Attach the provider's authentication headers.
    fn apply_auth(&self, builder: RequestBuilder, api_key: &str) -> RequestBuilder;
}

/// The provider catalog, in display order.
pub static PROVIDERS: [&'static dyn Provider; 3] = [&OpenAi, &Anthropic, &DeepSeek];

/// Look up a provider by identifier.
pub fn lookup(id: &str) -> Option<&'static dyn Provider> {
    PROVIDERS
        .iter()
        .copied()
        .find(|p| p.id().as_str() == id)
}

/// Adapter owning the HTTP client and credentials; one call per invocation.
pub struct ProviderAdapter {
    client: reqwest::Client,
    keys: ApiKeysConfig,
    max_tokens: u32,
    temperature: f32,
    endpoint_override: Option<String>,
}

impl ProviderAdapter {
    pub fn new(keys: ApiKeysConfig, chat: &ChatConfig) -> Self {
        Self {
            client: create_client_with_timeout(COMPLETION_TIMEOUT),
            keys,
            max_tokens: chat.max_tokens,
            temperature: chat.temperature,
            endpoint_override: None,
        }
    }

    /// Route every provider at `url` instead of its real endpoint (tests).
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint_override = Some(url.into());
        self
    }

    /// Resolve a provider identifier against the catalog.
    pub fn resolve(&self, id: &str) -> Result<&'static dyn Provider, OmaaError> {
        lookup(id).ok_or_else(|| OmaaError::UnknownProvider(id.to_string()))
    }

    /// Send one completion request and return the reply text.
    pub async fn complete(
        &self,
        provider_id: &str,
        model: Option<&str>,
        system_prompt: &str,
        messages: &[Message],
    ) -> Result<String, OmaaError> {
        let provider = self.resolve(provider_id)?;

        let api_key = self
            .keys
            .key_for(provider.id())
            .ok_or_else(|| OmaaError::ApiKeyMissing(provider.display_name().to_string()))?;

        let request = CompletionRequest {
            model: model.unwrap_or_else(|| provider.default_model()),
            system_prompt,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let body = provider.build_request(&request);

        let url = self
            .endpoint_override
            .as_deref()
            .unwrap_or_else(|| provider.endpoint());

        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        let builder = provider.apply_auth(builder, &api_key);

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| OmaaError::NetworkError(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(OmaaError::UpstreamError {
                status: Some(status.as_u16()),
                message: extract_upstream_message(&text).unwrap_or_else(|| {
                    format!("{} returned HTTP {}", provider.display_name(), status.as_u16())
                }),
            });
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            OmaaError::ParseError(format!(
                "{} | Response: {}",
                e,
                &text[..text.len().min(500)]
            ))
        })?;

        provider.parse_reply(&parsed)
    }
}

/// Pull the upstream `error.message` out of an error body, if present.
fn extract_upstream_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value["error"]["message"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;
    use serde_json::json;

    fn keys_with_all() -> ApiKeysConfig {
        ApiKeysConfig {
            openai: Some("sk-openai".to_string()),
            anthropic: Some("sk-ant".to_string()),
            deepseek: Some("sk-deep".to_string()),
        }
    }

    fn adapter(keys: ApiKeysConfig) -> ProviderAdapter {
        ProviderAdapter::new(keys, &ChatConfig::default())
    }

    #[test]
    fn lookup_finds_all_catalog_entries() {
        for id in ["openai", "anthropic", "deepseek"] {
            let provider = lookup(id).unwrap();
            assert_eq!(provider.id().as_str(), id);
            assert!(!provider.models().is_empty());
            assert!(provider.models().contains(&provider.default_model()));
        }
    }

    #[test]
    fn lookup_returns_none_for_unknown_id() {
        assert!(lookup("grok").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn provider_id_round_trips_through_strings() {
        for id in [ProviderId::OpenAi, ProviderId::Anthropic, ProviderId::DeepSeek] {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
        }
        assert!("mistral".parse::<ProviderId>().is_err());
    }

    #[tokio::test]
    async fn complete_fails_for_unknown_provider() {
        let adapter = adapter(keys_with_all());
        let result = adapter.complete("grok", None, "S", &[]).await;

        assert!(matches!(result, Err(OmaaError::UnknownProvider(_))));
    }

    #[tokio::test]
    async fn complete_fails_without_credential() {
        let adapter = adapter(ApiKeysConfig::default());
        let messages = [Message::new(Role::User, "hi")];
        let result = adapter.complete("openai", None, "S", &messages).await;

        match result {
            Err(OmaaError::ApiKeyMissing(name)) => assert_eq!(name, "OpenAI"),
            other => panic!("expected ApiKeyMissing, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn complete_parses_openai_shaped_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(
                json!({
                    "choices": [{"message": {"role": "assistant", "content": "Hello back"}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let adapter = adapter(keys_with_all()).with_endpoint(server.url());
        let messages = [Message::new(Role::User, "hi")];
        let reply = adapter
            .complete("openai", None, "S", &messages)
            .await
            .unwrap();

        assert_eq!(reply, "Hello back");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn complete_parses_anthropic_shaped_reply() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(
                json!({
                    "content": [{"type": "text", "text": "Claude says hi"}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let adapter = adapter(keys_with_all()).with_endpoint(server.url());
        let messages = [Message::new(Role::User, "hi")];
        let reply = adapter
            .complete("anthropic", None, "S", &messages)
            .await
            .unwrap();

        assert_eq!(reply, "Claude says hi");
    }

    #[tokio::test]
    async fn non_success_surfaces_upstream_error_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(429)
            .with_body(json!({"error": {"message": "Rate limit exceeded"}}).to_string())
            .create_async()
            .await;

        let adapter = adapter(keys_with_all()).with_endpoint(server.url());
        let messages = [Message::new(Role::User, "hi")];
        let result = adapter.complete("openai", None, "S", &messages).await;

        match result {
            Err(OmaaError::UpstreamError { status, message }) => {
                assert_eq!(status, Some(429));
                assert_eq!(message, "Rate limit exceeded");
            }
            other => panic!("expected UpstreamError, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn non_success_without_body_gets_status_coded_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(503)
            .with_body("")
            .create_async()
            .await;

        let adapter = adapter(keys_with_all()).with_endpoint(server.url());
        let messages = [Message::new(Role::User, "hi")];
        let result = adapter.complete("deepseek", None, "S", &messages).await;

        match result {
            Err(OmaaError::UpstreamError { status, message }) => {
                assert_eq!(status, Some(503));
                assert!(message.contains("503"));
            }
            other => panic!("expected UpstreamError, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn garbled_success_body_is_a_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body("<html>definitely not json</html>")
            .create_async()
            .await;

        let adapter = adapter(keys_with_all()).with_endpoint(server.url());
        let messages = [Message::new(Role::User, "hi")];
        let result = adapter.complete("openai", None, "S", &messages).await;

        assert!(matches!(result, Err(OmaaError::ParseError(_))));
    }

    #[test]
    fn extract_upstream_message_handles_all_shapes() {
        assert_eq!(
            extract_upstream_message(r#"{"error":{"message":"boom"}}"#),
            Some("boom".to_string())
        );
        assert_eq!(extract_upstream_message(r#"{"error":{"message":""}}"#), None);
        assert_eq!(extract_upstream_message("not json"), None);
        assert_eq!(extract_upstream_message(r#"{"detail":"other"}"#), None);
    }
}
