//! Terminal chat client.
//!
//! Embeds the orchestrator against a running gateway: conversation history
//! and preferences persist under the data directory, access is verified
//! remotely, and checkout redirects can be pasted back in to capture the
//! session id.

use crate::config::Config;
use crate::gate::{capture_checkout_redirect, AccessGate, GateState, VerifyClient};
use crate::orchestrator::{Orchestrator, SendOutcome};
use crate::provider::{lookup, ProviderAdapter};
use crate::store::ConversationStore;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Persisted client preferences and the captured session identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClientState {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ClientState {
    pub fn default_path() -> PathBuf {
        Config::data_dir().join("client.toml")
    }

    /// Load state, treating a missing or corrupt file as empty.
    pub fn load_from(path: &PathBuf) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("client state unreadable ({}), starting fresh", e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

/// Whether the gateway has billing enabled. Unreachable counts as enabled,
/// so access stays gated (fail closed) until the gateway answers.
async fn gateway_has_billing(gateway_url: &str) -> bool {
    let url = format!("{}/api/health", gateway_url);
    match crate::http::create_client().get(&url).send().await {
        Ok(response) => response
            .json::<serde_json::Value>()
            .await
            .map(|body| body["stripe"].as_bool().unwrap_or(true))
            .unwrap_or(true),
        Err(_) => true,
    }
}

/// Run the interactive chat loop until EOF or `/quit`.
pub async fn run_chat(config: Config, session_override: Option<String>) -> anyhow::Result<()> {
    let state_path = ClientState::default_path();
    let mut client_state = ClientState::load_from(&state_path);
    if let Some(session_id) = session_override {
        client_state.session_id = Some(session_id);
        client_state.save_to(&state_path)?;
    }

    let provider_id = client_state
        .provider
        .clone()
        .unwrap_or_else(|| config.chat.provider.clone());
    let model = client_state.model.clone().or_else(|| config.chat.model.clone());

    let adapter = ProviderAdapter::new(config.api_keys.clone(), &config.chat);
    let store = ConversationStore::open(
        Config::data_dir().join("conversation.db"),
        config.chat.history_cap,
    )?;

    let gateway_url = config.gateway_url();
    let verify = VerifyClient::new(gateway_url.clone());
    let gate = if gateway_has_billing(&gateway_url).await {
        Some(AccessGate::new(verify, client_state.session_id.clone()))
    } else {
        println!("Gateway has no billing configured; chatting ungated.");
        None
    };

    let mut orchestrator = Orchestrator::new(
        adapter,
        store,
        gate,
        provider_id,
        model,
        config.chat.system_prompt.clone(),
    );

    println!("OMaa chat. /help for commands.");
    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim().to_string();

        if let Some(command) = line.strip_prefix('/') {
            if handle_command(command, &mut orchestrator, &mut client_state, &state_path)
                .await?
            {
                break;
            }
            continue;
        }

        match orchestrator.send(&line).await {
            Ok(SendOutcome::Reply(reply)) => {
                println!("omaa> {}", reply);
                if let Some(remaining) = orchestrator.messages_remaining() {
                    println!("      ({} trial messages left)", remaining);
                }
            }
            Ok(SendOutcome::Blocked(reason)) => {
                println!("omaa> {}", reason.paywall_message());
                println!("      Use /upgrade to subscribe.");
            }
            Ok(SendOutcome::Ignored) => {}
            Err(e) => {
                // The failed attempt was rolled back; just show the error.
                println!("omaa> {}", e);
            }
        }
    }

    Ok(())
}

/// Handle a slash command; returns `true` to quit.
async fn handle_command(
    command: &str,
    orchestrator: &mut Orchestrator,
    client_state: &mut ClientState,
    state_path: &PathBuf,
) -> anyhow::Result<bool> {
    let mut parts = command.split_whitespace();
    match parts.next().unwrap_or("") {
        "quit" | "exit" => return Ok(true),
        "help" => {
            println!("Commands: /provider <id>, /model <name>, /status, /upgrade, /clear, /quit");
        }
        "clear" => {
            orchestrator.store().clear()?;
            println!("Conversation cleared.");
        }
        "provider" => match parts.next() {
            Some(id) if lookup(id).is_some() => {
                orchestrator.set_provider(id, client_state.model.clone());
                client_state.provider = Some(id.to_string());
                client_state.save_to(state_path)?;
                println!("Provider set to {}.", id);
            }
            Some(id) => println!("Unknown provider '{}'.", id),
            None => println!("Current provider: {}.", orchestrator.provider()),
        },
        "model" => match parts.next() {
            Some(model) => {
                let provider = orchestrator.provider().to_string();
                orchestrator.set_provider(provider, Some(model.to_string()));
                client_state.model = Some(model.to_string());
                client_state.save_to(state_path)?;
                println!("Model set to {}.", model);
            }
            None => println!("Usage: /model <name>"),
        },
        "status" => match orchestrator.gate_mut() {
            Some(gate) => {
                gate.verify().await;
                match gate.state() {
                    GateState::Allowed => match gate.snapshot() {
                        Some(snapshot) => println!(
                            "Access OK ({:?}, {:?} messages remaining).",
                            snapshot.subscription_status, snapshot.messages_remaining
                        ),
                        None => println!("Access OK."),
                    },
                    GateState::Blocked(reason) => println!("{}", reason.paywall_message()),
                    _ => {}
                }
            }
            None => println!("Billing disabled; access is open."),
        },
        "upgrade" => {
            let Some(gate) = orchestrator.gate_mut() else {
                println!("Billing disabled; nothing to upgrade.");
                return Ok(false);
            };
            match gate.start_checkout().await {
                Ok(url) => {
                    println!("Open this URL to subscribe:\n  {}", url);
                    println!("After payment, paste the redirect URL here (Enter to skip):");
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line)?;
                    match capture_checkout_redirect(line.trim()) {
                        Some(captured) => {
                            client_state.session_id = Some(captured.session_id.clone());
                            client_state.save_to(state_path)?;
                            gate.set_session(captured.session_id);
                            gate.verify().await;
                            println!("Session captured. You're all set.");
                        }
                        None => {
                            if !line.trim().is_empty() {
                                println!("That URL has no completed checkout in it.");
                            }
                        }
                    }
                }
                // One-shot: surface the failure, never retry automatically.
                Err(e) => println!("Upgrade failed: {}", e),
            }
        }
        other => println!("Unknown command '/{}'. Try /help.", other),
    }
    Ok(false)
}
