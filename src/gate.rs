//! Access gate: remote-verification policy.
//!
//! Every access decision is delegated to the gateway, keyed by the stored
//! checkout session identifier. The client never computes message limits
//! itself; it relays the verified snapshot and exposes a textual paywall
//! reason for display. A verification failure of any kind blocks sending
//! (fail closed) rather than granting unmetered access.

use crate::error::OmaaError;
use crate::http::create_client;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

/// Remaining message allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Limited(u32),
    Unlimited,
}

impl Serialize for Quota {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Quota::Limited(n) => serializer.serialize_u32(*n),
            Quota::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

impl<'de> Deserialize<'de> for Quota {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Count(u32),
            Tag(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Count(n) => Ok(Quota::Limited(n)),
            Repr::Tag(s) if s == "unlimited" => Ok(Quota::Unlimited),
            Repr::Tag(s) => Err(serde::de::Error::custom(format!(
                "invalid quota value: {}",
                s
            ))),
        }
    }
}

/// Subscription lifecycle status as reported by the payment processor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    Canceled,
    PastDue,
    None,
}

impl SubscriptionStatus {
    /// Map a Stripe subscription status string onto the local enum.
    pub fn from_stripe(status: &str) -> Self {
        match status {
            "trialing" => Self::Trialing,
            "active" => Self::Active,
            "past_due" => Self::PastDue,
            "canceled" | "unpaid" | "incomplete" | "incomplete_expired" | "paused" => {
                Self::Canceled
            }
            _ => Self::None,
        }
    }
}

/// Why the gate refused a send.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    NotEnrolled,
    MessageLimit,
    SubscriptionEnded,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotEnrolled => "not_enrolled",
            Self::MessageLimit => "message_limit",
            Self::SubscriptionEnded => "subscription_ended",
        }
    }

    /// Paywall text shown to the user.
    pub fn paywall_message(&self) -> &'static str {
        match self {
            Self::NotEnrolled => "Start your free trial to chat with OMaa.",
            Self::MessageLimit => {
                "You've used all your trial messages. Upgrade to keep chatting."
            }
            Self::SubscriptionEnded => "Your subscription has ended. Renew to keep chatting.",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verified access snapshot. Rebuilt wholesale on every check, never
/// partially mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessState {
    pub has_session: bool,
    pub valid: bool,
    pub can_chat: bool,
    pub is_paid: bool,
    pub is_trialing: bool,
    pub messages_remaining: Quota,
    pub subscription_status: SubscriptionStatus,
    pub trial_end: Option<DateTime<Utc>>,
}

impl AccessState {
    /// Snapshot for a missing or unrecognized session.
    pub fn not_enrolled(has_session: bool) -> Self {
        Self {
            has_session,
            valid: false,
            can_chat: false,
            is_paid: false,
            is_trialing: false,
            messages_remaining: Quota::Limited(0),
            subscription_status: SubscriptionStatus::None,
            trial_end: None,
        }
    }

    /// The block reason implied by this snapshot, if sending is denied.
    pub fn denied_reason(&self) -> Option<BlockReason> {
        if self.can_chat {
            return None;
        }
        if !self.valid {
            return Some(BlockReason::NotEnrolled);
        }
        // is_paid wins over is_trialing when both are set; a paid snapshot
        // that cannot chat means the subscription lapsed, not the trial.
        if !self.is_paid && self.is_trialing && self.messages_remaining == Quota::Limited(0) {
            return Some(BlockReason::MessageLimit);
        }
        Some(BlockReason::SubscriptionEnded)
    }
}

/// Usage counter report from the track endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub messages_used: u32,
    pub messages_remaining: Quota,
    pub limit_reached: bool,
    pub success: bool,
}

/// Gate lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    Unverified,
    Verifying,
    Allowed,
    Blocked(BlockReason),
}

/// Resolve a verification outcome into the next gate state.
///
/// A transport failure blocks with `not_enrolled` (fail closed).
fn resolve_outcome(outcome: Result<AccessState, OmaaError>) -> (GateState, Option<AccessState>) {
    match outcome {
        Ok(state) if state.valid && state.can_chat => (GateState::Allowed, Some(state)),
        Ok(state) => {
            let reason = state.denied_reason().unwrap_or(BlockReason::NotEnrolled);
            (GateState::Blocked(reason), Some(state))
        }
        Err(e) => {
            tracing::warn!("access verification failed, blocking: {}", e);
            (GateState::Blocked(BlockReason::NotEnrolled), None)
        }
    }
}

/// HTTP client for the gateway's verification and billing endpoints.
#[derive(Clone)]
pub struct VerifyClient {
    client: reqwest::Client,
    base_url: String,
}

impl VerifyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: create_client(),
            base_url: base_url.into(),
        }
    }

    pub async fn verify_session(&self, session_id: &str) -> Result<AccessState, OmaaError> {
        let url = format!(
            "{}/api/verify-session?session_id={}",
            self.base_url, session_id
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OmaaError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OmaaError::UpstreamError {
                status: Some(response.status().as_u16()),
                message: "session verification failed".to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| OmaaError::ParseError(e.to_string()))
    }

    pub async fn track_message(&self, session_id: &str) -> Result<UsageReport, OmaaError> {
        let url = format!("{}/api/track-message", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "session_id": session_id }))
            .send()
            .await
            .map_err(|e| OmaaError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OmaaError::UpstreamError {
                status: Some(response.status().as_u16()),
                message: "usage tracking failed".to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| OmaaError::ParseError(e.to_string()))
    }

    /// Request a hosted checkout URL. One-shot; the caller navigates to it.
    pub async fn create_checkout(&self) -> Result<String, OmaaError> {
        let url = format!("{}/api/create-checkout-session", self.base_url);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| OmaaError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OmaaError::UpstreamError {
                status: Some(response.status().as_u16()),
                message: "checkout session request failed".to_string(),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OmaaError::ParseError(e.to_string()))?;

        body["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| OmaaError::BillingError("checkout response missing url".to_string()))
    }
}

/// The access gate: a state machine over remote verification.
pub struct AccessGate {
    client: VerifyClient,
    session_id: Option<String>,
    state: GateState,
    snapshot: Option<AccessState>,
}

impl AccessGate {
    pub fn new(client: VerifyClient, session_id: Option<String>) -> Self {
        Self {
            client,
            session_id,
            state: GateState::Unverified,
            snapshot: None,
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn snapshot(&self) -> Option<&AccessState> {
        self.snapshot.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Adopt a newly captured session id and force re-verification.
    pub fn set_session(&mut self, session_id: String) {
        self.session_id = Some(session_id);
        self.state = GateState::Unverified;
        self.snapshot = None;
    }

    /// Run one verification pass. Any prior state re-enters Verifying.
    pub async fn verify(&mut self) -> &GateState {
        self.state = GateState::Verifying;

        let Some(session_id) = self.session_id.clone() else {
            self.state = GateState::Blocked(BlockReason::NotEnrolled);
            return &self.state;
        };

        let outcome = self.client.verify_session(&session_id).await;
        let (state, snapshot) = resolve_outcome(outcome);
        self.state = state;
        self.snapshot = snapshot;
        &self.state
    }

    pub fn can_send(&self) -> bool {
        matches!(self.state, GateState::Allowed)
    }

    pub fn block_reason(&self) -> Option<BlockReason> {
        match self.state {
            GateState::Blocked(reason) => Some(reason),
            _ => None,
        }
    }

    /// Record one consumed message and refresh the remaining count.
    pub async fn record_message(&mut self) -> Result<UsageReport, OmaaError> {
        let session_id = self
            .session_id
            .clone()
            .ok_or(OmaaError::AccessDenied(BlockReason::NotEnrolled))?;

        let report = self.client.track_message(&session_id).await?;

        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.messages_remaining = report.messages_remaining;
        }
        if report.limit_reached {
            self.state = GateState::Blocked(BlockReason::MessageLimit);
        }
        Ok(report)
    }

    /// Request a hosted checkout URL via the gateway.
    pub async fn start_checkout(&self) -> Result<String, OmaaError> {
        self.client.create_checkout().await
    }
}

/// A captured checkout redirect: the session id plus the URL with the
/// checkout parameters stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRedirect {
    pub session_id: String,
    pub stripped_url: String,
}

/// Capture `session_id` + `status=success` from a checkout redirect URL.
///
/// Returns `None` unless both parameters are present and status is
/// `success`. The stripped URL keeps every other query parameter.
pub fn capture_checkout_redirect(redirect_url: &str) -> Option<CheckoutRedirect> {
    let parsed = Url::parse(redirect_url).ok()?;

    let mut session_id = None;
    let mut success = false;
    let mut kept: Vec<(String, String)> = Vec::new();

    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "session_id" => session_id = Some(value.into_owned()),
            "status" => success = value == "success",
            _ => kept.push((key.into_owned(), value.into_owned())),
        }
    }

    let session_id = session_id.filter(|_| success)?;

    let mut stripped = parsed.clone();
    stripped.set_query(None);
    if !kept.is_empty() {
        let mut pairs = stripped.query_pairs_mut();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
    }

    Some(CheckoutRedirect {
        session_id,
        stripped_url: stripped.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn allowed_snapshot() -> serde_json::Value {
        json!({
            "hasSession": true,
            "valid": true,
            "canChat": true,
            "isPaid": false,
            "isTrialing": true,
            "messagesRemaining": 12,
            "subscriptionStatus": "trialing",
            "trialEnd": null
        })
    }

    #[test]
    fn quota_serializes_counts_and_unlimited() {
        assert_eq!(serde_json::to_value(Quota::Limited(5)).unwrap(), json!(5));
        assert_eq!(
            serde_json::to_value(Quota::Unlimited).unwrap(),
            json!("unlimited")
        );
        assert_eq!(
            serde_json::from_value::<Quota>(json!("unlimited")).unwrap(),
            Quota::Unlimited
        );
        assert_eq!(
            serde_json::from_value::<Quota>(json!(3)).unwrap(),
            Quota::Limited(3)
        );
        assert!(serde_json::from_value::<Quota>(json!("lots")).is_err());
    }

    #[test]
    fn subscription_status_maps_stripe_strings() {
        assert_eq!(
            SubscriptionStatus::from_stripe("trialing"),
            SubscriptionStatus::Trialing
        );
        assert_eq!(
            SubscriptionStatus::from_stripe("active"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_stripe("past_due"),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            SubscriptionStatus::from_stripe("unpaid"),
            SubscriptionStatus::Canceled
        );
    }

    #[test]
    fn access_state_round_trips_camel_case() {
        let state: AccessState = serde_json::from_value(allowed_snapshot()).unwrap();
        assert!(state.valid);
        assert!(state.can_chat);
        assert_eq!(state.messages_remaining, Quota::Limited(12));
        assert_eq!(state.subscription_status, SubscriptionStatus::Trialing);

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["canChat"], true);
        assert_eq!(value["subscriptionStatus"], "trialing");
    }

    #[test]
    fn denied_reason_prefers_not_enrolled_for_invalid_sessions() {
        let state = AccessState::not_enrolled(true);
        assert_eq!(state.denied_reason(), Some(BlockReason::NotEnrolled));
    }

    #[test]
    fn denied_reason_reports_message_limit_for_exhausted_trial() {
        let state = AccessState {
            has_session: true,
            valid: true,
            can_chat: false,
            is_paid: false,
            is_trialing: true,
            messages_remaining: Quota::Limited(0),
            subscription_status: SubscriptionStatus::Trialing,
            trial_end: None,
        };
        assert_eq!(state.denied_reason(), Some(BlockReason::MessageLimit));
    }

    #[test]
    fn denied_reason_reports_subscription_ended_for_lapsed_plans() {
        let state = AccessState {
            has_session: true,
            valid: true,
            can_chat: false,
            is_paid: false,
            is_trialing: false,
            messages_remaining: Quota::Limited(0),
            subscription_status: SubscriptionStatus::Canceled,
            trial_end: None,
        };
        assert_eq!(state.denied_reason(), Some(BlockReason::SubscriptionEnded));
    }

    #[test]
    fn resolve_outcome_fails_closed_on_transport_error() {
        let (state, snapshot) =
            resolve_outcome(Err(OmaaError::NetworkError("timeout".to_string())));
        assert_eq!(state, GateState::Blocked(BlockReason::NotEnrolled));
        assert!(snapshot.is_none());
    }

    #[tokio::test]
    async fn gate_without_session_blocks_without_a_network_call() {
        let client = VerifyClient::new("http://127.0.0.1:1");
        let mut gate = AccessGate::new(client, None);

        let state = gate.verify().await;
        assert_eq!(*state, GateState::Blocked(BlockReason::NotEnrolled));
    }

    #[tokio::test]
    async fn gate_allows_when_server_reports_valid_and_can_chat() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/verify-session?session_id=cs_123")
            .with_status(200)
            .with_body(allowed_snapshot().to_string())
            .create_async()
            .await;

        let client = VerifyClient::new(server.url());
        let mut gate = AccessGate::new(client, Some("cs_123".to_string()));

        gate.verify().await;
        assert!(gate.can_send());
        assert_eq!(
            gate.snapshot().unwrap().messages_remaining,
            Quota::Limited(12)
        );
    }

    #[tokio::test]
    async fn gate_blocks_not_enrolled_when_server_reports_invalid() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/verify-session?session_id=cs_bad")
            .with_status(200)
            .with_body(
                serde_json::to_string(&AccessState::not_enrolled(true)).unwrap(),
            )
            .create_async()
            .await;

        let client = VerifyClient::new(server.url());
        let mut gate = AccessGate::new(client, Some("cs_bad".to_string()));

        gate.verify().await;
        assert!(!gate.can_send());
        assert_eq!(gate.block_reason(), Some(BlockReason::NotEnrolled));
    }

    #[tokio::test]
    async fn gate_fails_closed_when_server_is_unreachable() {
        // Nothing listens on port 1.
        let client = VerifyClient::new("http://127.0.0.1:1");
        let mut gate = AccessGate::new(client, Some("cs_123".to_string()));

        gate.verify().await;
        assert_eq!(gate.block_reason(), Some(BlockReason::NotEnrolled));
    }

    #[tokio::test]
    async fn record_message_flips_gate_to_message_limit_at_the_cap() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/verify-session?session_id=cs_123")
            .with_status(200)
            .with_body(allowed_snapshot().to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/api/track-message")
            .with_status(200)
            .with_body(
                json!({
                    "messagesUsed": 20,
                    "messagesRemaining": 0,
                    "limitReached": true,
                    "success": true
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = VerifyClient::new(server.url());
        let mut gate = AccessGate::new(client, Some("cs_123".to_string()));
        gate.verify().await;
        assert!(gate.can_send());

        let report = gate.record_message().await.unwrap();
        assert!(report.limit_reached);
        assert_eq!(gate.block_reason(), Some(BlockReason::MessageLimit));
        assert_eq!(
            gate.snapshot().unwrap().messages_remaining,
            Quota::Limited(0)
        );
    }

    #[tokio::test]
    async fn checkout_without_url_field_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/create-checkout-session")
            .with_status(200)
            .with_body(json!({"id": "cs_123"}).to_string())
            .create_async()
            .await;

        let client = VerifyClient::new(server.url());
        let result = client.create_checkout().await;

        assert!(matches!(result, Err(OmaaError::BillingError(_))));
    }

    #[test]
    fn captures_session_id_from_successful_redirect() {
        let captured = capture_checkout_redirect(
            "https://omaa.app/chat?session_id=cs_live_42&status=success",
        )
        .unwrap();

        assert_eq!(captured.session_id, "cs_live_42");
        assert_eq!(captured.stripped_url, "https://omaa.app/chat");
    }

    #[test]
    fn capture_keeps_unrelated_query_parameters() {
        let captured = capture_checkout_redirect(
            "https://omaa.app/chat?ref=email&session_id=cs_1&status=success",
        )
        .unwrap();

        assert_eq!(captured.session_id, "cs_1");
        assert_eq!(captured.stripped_url, "https://omaa.app/chat?ref=email");
    }

    #[test]
    fn capture_requires_success_status() {
        assert!(capture_checkout_redirect("https://omaa.app/chat?session_id=cs_1").is_none());
        assert!(capture_checkout_redirect(
            "https://omaa.app/chat?session_id=cs_1&status=canceled"
        )
        .is_none());
        assert!(capture_checkout_redirect("https://omaa.app/chat?status=success").is_none());
        assert!(capture_checkout_redirect("not a url").is_none());
    }
}
