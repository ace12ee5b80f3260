//! Agent Web Runtime
//!
//! The entry point for the fabric: runs the central Indexer, hosts a
//! long-lived agent with the built-in echo handler, or fires one-shot
//! ranked tasks against the network.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use agentweb::config::{load_config, resolve_path, save_config};
use agentweb::identity::keystore;
use agentweb::overlay::MemoryOverlay;
use agentweb::runtime::AgentRuntime;
use agentweb::types::{default_agent_config, MessageHandler, RankingPolicy};

const VERSION: &str = "0.1.0";

/// Agent Web -- decentralized service directory and signed RPC fabric
#[derive(Parser, Debug)]
#[command(
    name = "agentweb",
    version = VERSION,
    about = "Agent Web -- decentralized service directory and signed RPC fabric"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the central Indexer service
    Indexer {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Run a long-lived agent with the built-in echo handler
    Agent {
        /// Path to the agent config file
        #[arg(long, default_value = "~/.agentweb/agent.json")]
        config: String,
    },
    /// Rank providers of a capability and send them a message
    Task {
        #[arg(long, default_value = "~/.agentweb/agent.json")]
        config: String,
        /// Capability to search for
        #[arg(long)]
        capability: String,
        /// JSON message body to send to the winner
        #[arg(long)]
        message: String,
        /// Override the configured price weight
        #[arg(long)]
        price_weight: Option<f64>,
        /// Override the configured reputation weight
        #[arg(long)]
        reputation_weight: Option<f64>,
    },
    /// Create the key file and a default config
    Init {
        #[arg(long, default_value = "~/.agentweb/agent.json")]
        config: String,
    },
    /// Show identity and configuration summary
    Status {
        #[arg(long, default_value = "~/.agentweb/agent.json")]
        config: String,
    },
}

// ---- Built-in Handler -------------------------------------------------------

/// Demo handler: echoes the verified message back to the sender.
struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(&self, sender_did: &str, body: Value) -> Result<Value> {
        Ok(json!({"echo": body, "served_for": sender_did}))
    }
}

// ---- Commands ---------------------------------------------------------------

fn load_config_or_fail(path: &str) -> Result<agentweb::types::AgentConfig> {
    let resolved = resolve_path(path);
    load_config(Path::new(&resolved))
        .with_context(|| format!("No usable config at {} (run: agentweb init)", resolved))
}

async fn run_agent(config_path: &str) -> Result<()> {
    let config = load_config_or_fail(config_path)?;

    // Single-process overlay; deployments substitute a DHT-backed
    // OverlayClient and typically enable fallback discovery.
    let overlay = Arc::new(MemoryOverlay::new());
    let runtime = AgentRuntime::new(config, overlay, Arc::new(EchoHandler))?;
    runtime.serve().await
}

async fn run_task(
    config_path: &str,
    capability: &str,
    message: &str,
    price_weight: Option<f64>,
    reputation_weight: Option<f64>,
) -> Result<()> {
    let config = load_config_or_fail(config_path)?;
    let body: Value =
        serde_json::from_str(message).context("Message body must be valid JSON")?;

    let policy = match (price_weight, reputation_weight) {
        (None, None) => None,
        (price, reputation) => {
            let defaults = config.default_policy;
            Some(RankingPolicy {
                price: price.unwrap_or(defaults.price),
                reputation: reputation.unwrap_or(defaults.reputation),
            })
        }
    };

    let overlay = Arc::new(MemoryOverlay::new());
    let runtime = AgentRuntime::new(config, overlay, Arc::new(EchoHandler))?;

    let response = runtime
        .execute_task(capability, body, policy.as_ref())
        .await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_init(config_path: &str) -> Result<()> {
    let resolved = resolve_path(config_path);
    let path = Path::new(&resolved);

    let config = match load_config(path) {
        Some(existing) => existing,
        None => {
            let fresh = default_agent_config();
            save_config(path, &fresh)?;
            fresh
        }
    };

    let key_path = resolve_path(&config.key_file);
    let keypair = keystore::load_or_create(Path::new(&key_path))?;

    println!(
        "{}",
        json!({
            "did": keypair.did(),
            "key_file": key_path,
            "config": resolved,
        })
    );
    Ok(())
}

fn show_status(config_path: &str) {
    let resolved = resolve_path(config_path);
    let Some(config) = load_config(Path::new(&resolved)) else {
        println!("Agent is not configured. Run: agentweb init");
        return;
    };

    let key_path = resolve_path(&config.key_file);
    let did = if Path::new(&key_path).exists() {
        match keystore::load_or_create(Path::new(&key_path)) {
            Ok(keypair) => keypair.did().to_string(),
            Err(e) => format!("<unreadable key: {}>", e),
        }
    } else {
        "<no key yet>".to_string()
    };

    println!(
        r#"
=== AGENT STATUS ===
DID:          {}
Key file:     {}
Registry:     {}
Capabilities: {:?}
Price:        {}
Policy:       price={}, reputation={}
Fallback:     {}
Listener:     {}:{}
Version:      {}
====================
"#,
        did,
        key_path,
        config.registry_url,
        config.capabilities,
        config.price,
        config.default_policy.price,
        config.default_policy.reputation,
        config.fallback_discovery_enabled,
        config.http_host,
        config.http_port,
        VERSION,
    );
}

// ---- Entry Point -----------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Indexer { host, port } => agentweb::indexer::serve(&host, port).await,
        Command::Agent { config } => run_agent(&config).await,
        Command::Task {
            config,
            capability,
            message,
            price_weight,
            reputation_weight,
        } => {
            run_task(
                &config,
                &capability,
                &message,
                price_weight,
                reputation_weight,
            )
            .await
        }
        Command::Init { config } => run_init(&config),
        Command::Status { config } => {
            show_status(&config);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}
