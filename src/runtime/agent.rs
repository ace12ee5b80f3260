//! Agent Runtime
//!
//! The long-running agent process: loads the keypair, joins the overlay,
//! serves `/invoke`, publishes its record, registers capabilities, and
//! exposes the outbound task API. Lifecycle phases only move forward; a
//! failed capability registration is non-fatal because peers can still
//! reach the agent through the overlay.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::resolve_path;
use crate::error::Error;
use crate::identity::keystore::{self, Keypair};
use crate::overlay::OverlayClient;
use crate::ranking::RankingEngine;
use crate::registry::{IndexerClient, RecordRegistry};
use crate::rpc::{self, RpcTransport};
use crate::types::{AgentConfig, AgentRecord, MessageHandler, RankingPolicy, RuntimePhase};

pub struct AgentRuntime {
    config: AgentConfig,
    keypair: Arc<Keypair>,
    records: RecordRegistry,
    indexer: IndexerClient,
    engine: RankingEngine,
    transport: RpcTransport,
    handler: Arc<dyn MessageHandler>,
    phase: RwLock<RuntimePhase>,
}

impl AgentRuntime {
    /// Build a runtime from config, an overlay client, and the inbound
    /// message handler. Loads or creates the keypair; a bad key file is
    /// fatal here.
    pub fn new(
        config: AgentConfig,
        overlay: Arc<dyn OverlayClient>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, Error> {
        let key_path = resolve_path(&config.key_file);
        let keypair = Arc::new(keystore::load_or_create(Path::new(&key_path))?);
        info!(
            "{} -> {}: key {}, DID {}",
            RuntimePhase::Initializing,
            RuntimePhase::KeyReady,
            key_path,
            keypair.did()
        );

        let indexer = IndexerClient::new(config.registry_url.clone());
        let fallback = config.fallback_discovery_enabled.then(|| indexer.clone());
        let records = RecordRegistry::new(overlay, fallback);
        let engine = RankingEngine::new(indexer.clone(), records.clone());
        let transport = RpcTransport::new(keypair.clone(), records.clone(), indexer.clone());

        Ok(Self {
            config,
            keypair,
            records,
            indexer,
            engine,
            transport,
            handler,
            phase: RwLock::new(RuntimePhase::KeyReady),
        })
    }

    pub fn did(&self) -> &str {
        self.keypair.did()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub async fn phase(&self) -> RuntimePhase {
        *self.phase.read().await
    }

    async fn advance(&self, next: RuntimePhase) {
        let mut phase = self.phase.write().await;
        if next <= *phase {
            warn!("Ignoring backward phase transition {} -> {}", *phase, next);
            return;
        }
        info!("{} -> {}", *phase, next);
        *phase = next;
    }

    /// Publish this agent's record (overlay, plus the Indexer cache in
    /// fallback mode) and register its capabilities with the Indexer.
    pub async fn register(&self, endpoint: &str) -> Result<()> {
        let record = AgentRecord {
            public_key_pem: self.keypair.public_key_pem().to_string(),
            endpoint: endpoint.to_string(),
            price: self.config.price,
            payment_method: self.config.payment_method.clone(),
            capabilities: Some(self.config.capabilities.clone()),
        };
        self.records.publish(self.did(), &record).await?;

        self.indexer
            .register_capabilities(self.did(), &self.config.capabilities)
            .await
            .context("Capability registration failed")?;
        Ok(())
    }

    /// Rank providers of `capability` and send `body` to the winner.
    /// Falls back to the configured default policy when none is given.
    pub async fn execute_task(
        &self,
        capability: &str,
        body: Value,
        policy: Option<&RankingPolicy>,
    ) -> Result<Value, Error> {
        let policy = policy.copied().unwrap_or(self.config.default_policy);
        let winner = self.engine.select(capability, &policy).await?;
        self.transport.send(&winner, body).await
    }

    /// Send a signed message directly to a known DID.
    pub async fn send(&self, target_did: &str, body: Value) -> Result<Value, Error> {
        self.transport.send(target_did, body).await
    }

    /// Bind the inbound listener and serve it on a background task.
    /// Returns the bound address, which differs from the configured one
    /// when the config asks for port 0.
    pub async fn start_listener(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let app = rpc::listener::router(self.records.clone(), self.handler.clone());
        let listener = TcpListener::bind((self.config.http_host.as_str(), self.config.http_port))
            .await
            .with_context(|| {
                format!(
                    "Failed to bind listener on {}:{}",
                    self.config.http_host, self.config.http_port
                )
            })?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Listener exited: {}", e);
            }
        });

        Ok((addr, handle))
    }

    /// Run the full agent lifecycle until SIGINT or SIGTERM.
    pub async fn serve(&self) -> Result<()> {
        // The overlay handle is installed at construction; a DHT-backed
        // client performs its bootstrap inside its own constructor.
        info!(
            "Overlay node endpoint {}:{}",
            self.config.dht_host, self.config.dht_port
        );
        match &self.config.bootstrap_node {
            Some((host, port)) => info!("Overlay bootstrap peer {}:{}", host, port),
            None => info!("Running as overlay seed node"),
        }
        self.advance(RuntimePhase::OverlayJoined).await;

        let (addr, listener_handle) = self.start_listener().await?;
        self.advance(RuntimePhase::Listening).await;
        info!("Agent {} listening on {}", self.did(), addr);

        let endpoint = self
            .config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("http://{}", addr));
        match self.register(&endpoint).await {
            Ok(()) => self.advance(RuntimePhase::Registered).await,
            // Peers that discover this agent through the overlay can
            // still invoke it.
            Err(e) => warn!("Registration failed, serving inbound only: {:#}", e),
        }

        self.advance(RuntimePhase::Serving).await;
        shutdown_signal().await;

        self.advance(RuntimePhase::Shutdown).await;
        listener_handle.abort();
        Ok(())
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("Failed to register Ctrl+C handler");
        info!("Received shutdown signal");
    }
}
