//! Request and response types for the gateway API.

use crate::provider::ProviderId;
use crate::store::Message;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize)]
pub struct ChatApiRequest {
    pub messages: Vec<Message>,
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatApiResponse {
    pub content: String,
    pub provider: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub providers: ProvidersHealth,
    pub stripe: bool,
}

#[derive(Serialize)]
pub struct ProvidersHealth {
    pub openai: bool,
    pub anthropic: bool,
    pub deepseek: bool,
}

#[derive(Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderInfo>,
}

#[derive(Serialize)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub name: &'static str,
    pub default_model: &'static str,
    pub models: &'static [&'static str],
    pub configured: bool,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

#[derive(Deserialize)]
pub struct SessionQuery {
    pub session_id: String,
}

#[derive(Deserialize)]
pub struct TrackMessageRequest {
    pub session_id: String,
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
}
