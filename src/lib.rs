//! OMAA - Subscription-gated chat gateway for multiple AI providers.
//!
//! Features:
//! - One adapter per provider (OpenAI, Anthropic, DeepSeek) behind a shared
//!   strategy trait
//! - Server-side trial and subscription verification backed by Stripe
//! - Capped, persistent conversation history
//! - Gateway HTTP API plus a terminal chat client

pub mod api;
pub mod billing;
pub mod client;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod orchestrator;
pub mod provider;
pub mod store;
