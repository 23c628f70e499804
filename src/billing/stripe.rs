//! Minimal Stripe REST client.
//!
//! Covers the three calls this gateway needs (checkout session creation,
//! checkout session retrieval, subscription retrieval) plus webhook
//! signature verification. Requests are form-encoded, responses JSON, auth
//! is the secret key as a bearer token.

use crate::config::StripeConfig;
use crate::error::OmaaError;
use crate::http::create_client;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

/// Webhook signatures older than this are rejected.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Subscription id once the checkout completed.
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub trial_end: Option<i64>,
}

#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            client: create_client(),
            secret_key: secret_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API host (tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Create a subscription-mode checkout session and return its hosted URL.
    pub async fn create_checkout_session(
        &self,
        config: &StripeConfig,
    ) -> Result<CheckoutSession, OmaaError> {
        let price_id = config
            .price_id
            .as_deref()
            .ok_or_else(|| OmaaError::BillingError("no price id configured".to_string()))?;

        let trial_days = config.trial_period_days.to_string();
        let params: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            ("success_url", &config.success_url),
            ("cancel_url", &config.cancel_url),
            ("subscription_data[trial_period_days]", &trial_days),
        ];

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| OmaaError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(upstream_error(status.as_u16(), &text));
        }

        response
            .json()
            .await
            .map_err(|e| OmaaError::ParseError(e.to_string()))
    }

    /// Retrieve a checkout session; `Ok(None)` when Stripe does not know it.
    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSession>, OmaaError> {
        self.retrieve(&format!("/v1/checkout/sessions/{}", session_id))
            .await
    }

    /// Retrieve a subscription; `Ok(None)` when Stripe does not know it.
    pub async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, OmaaError> {
        self.retrieve(&format!("/v1/subscriptions/{}", subscription_id))
            .await
    }

    async fn retrieve<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, OmaaError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| OmaaError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(upstream_error(status.as_u16(), &text));
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| OmaaError::ParseError(e.to_string()))
    }
}

fn upstream_error(status: u16, body: &str) -> OmaaError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("payment API returned HTTP {}", status));
    OmaaError::UpstreamError {
        status: Some(status),
        message,
    }
}

/// Verify a `Stripe-Signature` header against the raw payload.
///
/// The header carries `t=<unix>,v1=<hex hmac>` pairs; the MAC is
/// HMAC-SHA256 over `"{t}.{payload}"` with the webhook secret.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), OmaaError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => {
                if let Some(bytes) = decode_hex(value) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| OmaaError::InvalidRequest("malformed signature header".to_string()))?;
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(OmaaError::InvalidRequest(
            "signature timestamp outside tolerance".to_string(),
        ));
    }
    if candidates.is_empty() {
        return Err(OmaaError::InvalidRequest(
            "malformed signature header".to_string(),
        ));
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| OmaaError::Internal(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    for candidate in &candidates {
        if mac.clone().verify_slice(candidate).is_ok() {
            return Ok(());
        }
    }

    Err(OmaaError::InvalidRequest(
        "signature verification failed".to_string(),
    ))
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let digest = mac.finalize().into_bytes();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        format!("t={},v1={}", timestamp, hex)
    }

    #[test]
    fn accepts_a_valid_signature() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign(payload, "whsec_test", 1_700_000_000);

        assert!(
            verify_webhook_signature(payload, &header, "whsec_test", 1_700_000_000).is_ok()
        );
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign(payload, "whsec_test", 1_700_000_000);

        let result = verify_webhook_signature(
            br#"{"type":"something.else"}"#,
            &header,
            "whsec_test",
            1_700_000_000,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_the_wrong_secret() {
        let payload = b"payload";
        let header = sign(payload, "whsec_real", 1_700_000_000);

        assert!(verify_webhook_signature(payload, &header, "whsec_fake", 1_700_000_000).is_err());
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let payload = b"payload";
        let header = sign(payload, "whsec_test", 1_700_000_000);

        let result = verify_webhook_signature(
            payload,
            &header,
            "whsec_test",
            1_700_000_000 + SIGNATURE_TOLERANCE_SECS + 1,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_a_malformed_header() {
        assert!(verify_webhook_signature(b"p", "garbage", "whsec_test", 0).is_err());
        assert!(verify_webhook_signature(b"p", "t=abc,v1=zz", "whsec_test", 0).is_err());
        assert!(verify_webhook_signature(b"p", "v1=aabb", "whsec_test", 0).is_err());
    }

    #[tokio::test]
    async fn create_checkout_session_posts_subscription_mode() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/checkout/sessions")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("mode".into(), "subscription".into()),
                mockito::Matcher::UrlEncoded(
                    "line_items[0][price]".into(),
                    "price_123".into(),
                ),
            ]))
            .with_status(200)
            .with_body(
                json!({"id": "cs_1", "url": "https://checkout.stripe.com/pay/cs_1"})
                    .to_string(),
            )
            .create_async()
            .await;

        let config = StripeConfig {
            price_id: Some("price_123".to_string()),
            ..StripeConfig::default()
        };
        let client = StripeClient::new("sk_test").with_base_url(server.url());
        let session = client.create_checkout_session(&config).await.unwrap();

        assert_eq!(session.url.as_deref(), Some("https://checkout.stripe.com/pay/cs_1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_checkout_session_requires_a_price_id() {
        let client = StripeClient::new("sk_test");
        let result = client
            .create_checkout_session(&StripeConfig::default())
            .await;

        assert!(matches!(result, Err(OmaaError::BillingError(_))));
    }

    #[tokio::test]
    async fn retrieve_unknown_session_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/checkout/sessions/cs_missing")
            .with_status(404)
            .with_body(json!({"error": {"message": "No such session"}}).to_string())
            .create_async()
            .await;

        let client = StripeClient::new("sk_test").with_base_url(server.url());
        let session = client.retrieve_checkout_session("cs_missing").await.unwrap();

        assert!(session.is_none());
    }

    #[tokio::test]
    async fn retrieve_subscription_parses_status_and_trial_end() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/subscriptions/sub_1")
            .with_status(200)
            .with_body(
                json!({"id": "sub_1", "status": "trialing", "trial_end": 1700000000})
                    .to_string(),
            )
            .create_async()
            .await;

        let client = StripeClient::new("sk_test").with_base_url(server.url());
        let sub = client
            .retrieve_subscription("sub_1")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(sub.status, "trialing");
        assert_eq!(sub.trial_end, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn upstream_errors_carry_the_stripe_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/subscriptions/sub_1")
            .with_status(401)
            .with_body(json!({"error": {"message": "Invalid API Key"}}).to_string())
            .create_async()
            .await;

        let client = StripeClient::new("sk_bad").with_base_url(server.url());
        let result = client.retrieve_subscription("sub_1").await;

        match result {
            Err(OmaaError::UpstreamError { status, message }) => {
                assert_eq!(status, Some(401));
                assert_eq!(message, "Invalid API Key");
            }
            other => panic!("expected UpstreamError, got {:?}", other.err()),
        }
    }
}
