//! OMAA CLI - Subscription-gated chat gateway for multiple AI providers.

use clap::{Parser, Subcommand};
use omaa::api::{create_router_with_state, AppState};
use omaa::config::Config;
use std::net::SocketAddr;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "omaa")]
#[command(about = "Subscription-gated chat gateway for OpenAI, Anthropic and DeepSeek")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Config file path
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,
    },

    /// Chat from the terminal against a running gateway
    Chat {
        /// Checkout session id to adopt before starting
        #[arg(short, long)]
        session_id: Option<String>,

        /// Config file path
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port, config }) => {
            run_server(port, config).await?;
        }
        Some(Commands::Chat { session_id, config }) => {
            init_tracing();
            let config = load_config(config)?;
            omaa::client::run_chat(config, session_id).await?;
        }
        Some(Commands::Config { path }) => {
            show_config(path)?;
        }
        None => {
            // Default: run server
            run_server(None, None).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

fn load_config(config_path: Option<std::path::PathBuf>) -> anyhow::Result<Config> {
    let config = match config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config.with_env_overrides())
}

async fn run_server(
    port_override: Option<u16>,
    config_path: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    init_tracing();

    let config = load_config(config_path)?;
    let port = port_override.unwrap_or(config.gateway.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let billing_enabled = config.stripe.secret_key.is_some();
    let state = AppState::from_config(config)?;
    let app = create_router_with_state(state);

    println!("→ OMAA gateway starting on http://{}", addr);
    println!("→ Chat API: http://{}/api/chat", addr);
    if !billing_enabled {
        println!("→ Billing disabled (no Stripe secret configured); chat is ungated");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("\nGateway stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn show_config(show_path: bool) -> anyhow::Result<()> {
    if show_path {
        println!("{}", Config::default_path().display());
        return Ok(());
    }

    let config = Config::load()?.with_env_overrides();
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
