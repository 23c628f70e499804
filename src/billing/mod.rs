//! Billing: subscription verification, usage metering and checkout.
//!
//! The gateway, not the client, owns every access decision. Snapshots are
//! rebuilt wholesale from Stripe on each verification call; a TTL cache of
//! the last good snapshot is served only when Stripe is unreachable.

mod stripe;
mod usage;

pub use stripe::{
    verify_webhook_signature, CheckoutSession, StripeClient, Subscription,
    SIGNATURE_TOLERANCE_SECS,
};
pub use usage::UsageDb;

use crate::config::Config;
use crate::error::OmaaError;
use crate::gate::{AccessState, Quota, SubscriptionStatus, UsageReport};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::sync::Mutex;
use std::time::Duration;

/// How long a last-good snapshot stays usable as a fallback.
const SNAPSHOT_FALLBACK_TTL: Duration = Duration::from_secs(3600);

/// Build an access snapshot from a verified subscription and usage count.
///
/// `is_paid` takes priority over `is_trialing` wherever one answer is
/// needed; the two are not asserted mutually exclusive.
pub fn build_access_state(
    status: SubscriptionStatus,
    trial_end: Option<DateTime<Utc>>,
    messages_used: u32,
    message_limit: u32,
) -> AccessState {
    let is_paid = status == SubscriptionStatus::Active;
    let is_trialing = status == SubscriptionStatus::Trialing;

    let messages_remaining = if is_paid {
        Quota::Unlimited
    } else {
        Quota::Limited(message_limit.saturating_sub(messages_used))
    };
    let can_chat = is_paid || (is_trialing && messages_used < message_limit);

    AccessState {
        has_session: true,
        valid: true,
        can_chat,
        is_paid,
        is_trialing,
        messages_remaining,
        subscription_status: status,
        trial_end,
    }
}

/// Server-side billing service.
pub struct BillingService {
    stripe: StripeClient,
    usage: Mutex<UsageDb>,
    snapshots: Cache<String, AccessState>,
    stripe_config: crate::config::StripeConfig,
    message_limit: u32,
}

impl BillingService {
    /// Build from config; `None` when no Stripe secret is configured
    /// (self-hosted mode: billing endpoints unavailable, chat ungated).
    pub fn from_config(config: &Config, usage: UsageDb) -> Option<Self> {
        let secret_key = config.stripe.secret_key.as_deref()?;
        Some(Self {
            stripe: StripeClient::new(secret_key),
            usage: Mutex::new(usage),
            snapshots: Cache::builder()
                .time_to_live(SNAPSHOT_FALLBACK_TTL)
                .build(),
            stripe_config: config.stripe.clone(),
            message_limit: config.trial.message_limit,
        })
    }

    /// Point the Stripe client at a different host (tests).
    pub fn with_stripe_base_url(mut self, url: impl Into<String>) -> Self {
        self.stripe = self.stripe.with_base_url(url);
        self
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.stripe_config.webhook_secret.as_deref()
    }

    /// Create a checkout session and return the hosted payment URL.
    pub async fn create_checkout(&self) -> Result<String, OmaaError> {
        let session = self
            .stripe
            .create_checkout_session(&self.stripe_config)
            .await?;
        session
            .url
            .ok_or_else(|| OmaaError::BillingError("checkout session has no url".to_string()))
    }

    /// The authoritative access snapshot for a session.
    ///
    /// Always asks Stripe; the cached snapshot is served only when the
    /// network call fails. With no fallback available the error propagates
    /// and callers fail closed.
    pub async fn access_snapshot(&self, session_id: &str) -> Result<AccessState, OmaaError> {
        match self.fetch_snapshot(session_id).await {
            Ok(snapshot) => {
                self.snapshots
                    .insert(session_id.to_string(), snapshot.clone())
                    .await;
                Ok(snapshot)
            }
            Err(OmaaError::NetworkError(msg)) => {
                match self.snapshots.get(session_id).await {
                    Some(cached) => {
                        tracing::warn!("payment API unreachable, serving cached snapshot");
                        Ok(cached)
                    }
                    None => Err(OmaaError::NetworkError(msg)),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_snapshot(&self, session_id: &str) -> Result<AccessState, OmaaError> {
        let Some(session) = self.stripe.retrieve_checkout_session(session_id).await? else {
            return Ok(AccessState::not_enrolled(true));
        };

        let Some(subscription_id) = session.subscription else {
            // Checkout never completed into a subscription.
            return Ok(AccessState::not_enrolled(true));
        };

        let Some(subscription) = self.stripe.retrieve_subscription(&subscription_id).await?
        else {
            return Ok(AccessState::not_enrolled(true));
        };

        let status = SubscriptionStatus::from_stripe(&subscription.status);
        let trial_end = subscription
            .trial_end
            .and_then(|ts| DateTime::from_timestamp(ts, 0));
        let used = self.messages_used(session_id)?;

        Ok(build_access_state(status, trial_end, used, self.message_limit))
    }

    /// Record one consumed message for a session.
    pub async fn track_message(&self, session_id: &str) -> Result<UsageReport, OmaaError> {
        let used = {
            let usage = self
                .usage
                .lock()
                .map_err(|e| OmaaError::Internal(format!("usage lock: {}", e)))?;
            usage
                .record_message(session_id)
                .map_err(|e| OmaaError::Storage(e.to_string()))?
        };

        // Paid sessions are tracked but never limited.
        let is_paid = self
            .access_snapshot(session_id)
            .await
            .map(|s| s.is_paid)
            .unwrap_or(false);

        let (messages_remaining, limit_reached) = if is_paid {
            (Quota::Unlimited, false)
        } else {
            (
                Quota::Limited(self.message_limit.saturating_sub(used)),
                used >= self.message_limit,
            )
        };

        Ok(UsageReport {
            messages_used: used,
            messages_remaining,
            limit_reached,
            success: true,
        })
    }

    fn messages_used(&self, session_id: &str) -> Result<u32, OmaaError> {
        let usage = self
            .usage
            .lock()
            .map_err(|e| OmaaError::Internal(format!("usage lock: {}", e)))?;
        usage
            .messages_used(session_id)
            .map_err(|e| OmaaError::Storage(e.to_string()))
    }
}
