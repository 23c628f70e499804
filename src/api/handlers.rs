//! HTTP handlers for the gateway API.

use super::types::*;
use super::AppState;
use crate::billing::{verify_webhook_signature, BillingService};
use crate::error::OmaaError;
use crate::gate::{AccessState, BlockReason, UsageReport};
use crate::provider::{ProviderId, PROVIDERS};
use crate::store::Role;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let keys = &state.config.api_keys;
    Json(HealthResponse {
        status: "ok",
        providers: ProvidersHealth {
            openai: keys.is_configured(ProviderId::OpenAi),
            anthropic: keys.is_configured(ProviderId::Anthropic),
            deepseek: keys.is_configured(ProviderId::DeepSeek),
        },
        stripe: state.billing.is_some(),
    })
}

pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<ProvidersResponse> {
    let keys = &state.config.api_keys;
    let providers = PROVIDERS
        .iter()
        .map(|p| ProviderInfo {
            id: p.id(),
            name: p.display_name(),
            default_model: p.default_model(),
            models: p.models(),
            configured: keys.is_configured(p.id()),
        })
        .collect();

    Json(ProvidersResponse { providers })
}

/// Billing service, or a configuration error when Stripe is not set up.
fn billing(state: &AppState) -> Result<&BillingService, OmaaError> {
    state
        .billing
        .as_ref()
        .ok_or_else(|| OmaaError::BillingError("billing is not configured".to_string()))
}

/// System prompt to inject: the configured one, unless the caller already
/// supplied a system message of its own.
fn effective_system_prompt<'a>(state: &'a AppState, request: &ChatApiRequest) -> &'a str {
    if request.messages.iter().any(|m| m.role == Role::System) {
        ""
    } else {
        &state.config.chat.system_prompt
    }
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatApiRequest>,
) -> Result<Json<ChatApiResponse>, OmaaError> {
    let last = request
        .messages
        .last()
        .ok_or_else(|| OmaaError::InvalidRequest("messages must not be empty".to_string()))?;
    if last.content.trim().is_empty() {
        return Err(OmaaError::InvalidRequest(
            "message content must not be empty".to_string(),
        ));
    }

    // With billing configured the gate is enforced here; the server is the
    // sole source of truth for access.
    if let Some(billing) = state.billing.as_ref() {
        let session_id = request
            .session_id
            .as_deref()
            .ok_or(OmaaError::AccessDenied(BlockReason::NotEnrolled))?;

        let snapshot = billing.access_snapshot(session_id).await?;
        if !snapshot.can_chat {
            let reason = snapshot
                .denied_reason()
                .unwrap_or(BlockReason::NotEnrolled);
            return Err(OmaaError::AccessDenied(reason));
        }
    }

    let system_prompt = effective_system_prompt(&state, &request);
    let content = state
        .adapter
        .complete(
            &request.provider,
            request.model.as_deref(),
            system_prompt,
            &request.messages,
        )
        .await?;

    if let (Some(billing), Some(session_id)) =
        (state.billing.as_ref(), request.session_id.as_deref())
    {
        if let Err(e) = billing.track_message(session_id).await {
            tracing::warn!("usage tracking failed: {}", e);
        }
    }

    Ok(Json(ChatApiResponse {
        content,
        provider: request.provider,
    }))
}

pub async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CheckoutResponse>, OmaaError> {
    let url = billing(&state)?.create_checkout().await?;
    Ok(Json(CheckoutResponse { url }))
}

pub async fn verify_session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<AccessState>, OmaaError> {
    let snapshot = billing(&state)?.access_snapshot(&query.session_id).await?;
    Ok(Json(snapshot))
}

pub async fn subscription_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<AccessState>, OmaaError> {
    let snapshot = billing(&state)?.access_snapshot(&query.session_id).await?;
    Ok(Json(snapshot))
}

pub async fn track_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrackMessageRequest>,
) -> Result<Json<UsageReport>, OmaaError> {
    let report = billing(&state)?.track_message(&request.session_id).await?;
    Ok(Json(report))
}

pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, OmaaError> {
    let billing = billing(&state)?;
    let secret = billing
        .webhook_secret()
        .ok_or_else(|| OmaaError::BillingError("webhook secret not configured".to_string()))?;

    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| OmaaError::InvalidRequest("missing Stripe-Signature".to_string()))?;

    verify_webhook_signature(
        body.as_bytes(),
        signature,
        secret,
        chrono::Utc::now().timestamp(),
    )?;

    let event: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| OmaaError::InvalidRequest(format!("malformed event: {}", e)))?;
    tracing::info!(
        event_type = event["type"].as_str().unwrap_or("unknown"),
        "stripe webhook received"
    );

    Ok(Json(WebhookAck { received: true }))
}
