//! Chat orchestration.
//!
//! Ties the access gate, conversation store and provider adapter together.
//! Services are constructor-injected so each piece tests in isolation.

use crate::error::OmaaError;
use crate::gate::{AccessGate, BlockReason, Quota};
use crate::provider::ProviderAdapter;
use crate::store::{ConversationStore, Role};

/// Outcome of one user-submitted message.
#[derive(Debug, PartialEq)]
pub enum SendOutcome {
    /// Assistant reply, ready to display.
    Reply(String),
    /// Empty or whitespace-only input; nothing happened.
    Ignored,
    /// The gate refused the send; show the paywall.
    Blocked(BlockReason),
}

pub struct Orchestrator {
    adapter: ProviderAdapter,
    store: ConversationStore,
    /// `None` when the deployment has no billing: nothing to gate.
    gate: Option<AccessGate>,
    provider: String,
    model: Option<String>,
    system_prompt: String,
}

impl Orchestrator {
    pub fn new(
        adapter: ProviderAdapter,
        store: ConversationStore,
        gate: Option<AccessGate>,
        provider: impl Into<String>,
        model: Option<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            adapter,
            store,
            gate,
            provider: provider.into(),
            model,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn gate(&self) -> Option<&AccessGate> {
        self.gate.as_ref()
    }

    pub fn gate_mut(&mut self) -> Option<&mut AccessGate> {
        self.gate.as_mut()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Switch the active provider (and optionally pin a model).
    pub fn set_provider(&mut self, provider: impl Into<String>, model: Option<String>) {
        self.provider = provider.into();
        self.model = model;
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Remaining trial messages, if the current snapshot meters them.
    pub fn messages_remaining(&self) -> Option<u32> {
        match self.gate.as_ref()?.snapshot()?.messages_remaining {
            Quota::Limited(n) => Some(n),
            Quota::Unlimited => None,
        }
    }

    /// Handle one user-submitted message.
    ///
    /// On adapter failure the just-appended user entry is rolled back, so
    /// failed attempts never count as history; the error is returned for
    /// display and the next attempt proceeds normally.
    pub async fn send(&mut self, input: &str) -> Result<SendOutcome, OmaaError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(SendOutcome::Ignored);
        }

        if let Some(gate) = self.gate.as_mut() {
            if !gate.can_send() {
                gate.verify().await;
            }
            if let Some(reason) = gate.block_reason() {
                return Ok(SendOutcome::Blocked(reason));
            }
        }

        self.store
            .append(Role::User, input)
            .map_err(|e| OmaaError::Storage(e.to_string()))?;

        let history = self
            .store
            .history()
            .map_err(|e| OmaaError::Storage(e.to_string()))?;

        let reply = match self
            .adapter
            .complete(
                &self.provider,
                self.model.as_deref(),
                &self.system_prompt,
                &history,
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                if let Err(rollback) = self.store.remove_last() {
                    tracing::warn!("failed to roll back user message: {}", rollback);
                }
                return Err(e);
            }
        };

        self.store
            .append(Role::Assistant, &reply)
            .map_err(|e| OmaaError::Storage(e.to_string()))?;

        // Usage is metered server-side; a tracking failure must not eat the
        // reply the user already paid a message for.
        if let Some(gate) = self.gate.as_mut() {
            if gate.session_id().is_some() {
                if let Err(e) = gate.record_message().await {
                    tracing::warn!("usage tracking failed: {}", e);
                }
            }
        }

        Ok(SendOutcome::Reply(reply))
    }
}
