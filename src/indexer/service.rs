//! Indexer Service
//!
//! The central Indexer as an HTTP server: capability registration and
//! search, batch reputation reads, transaction reports, and the record
//! cache for fallback discovery. One write lock guards all state, so
//! every mutation is atomic with respect to concurrent requests.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::indexer::ReputationTable;
use crate::types::{
    CachedRecord, CapabilityRegistration, ReputationRequest, ReputationResponse, ReputationStats,
    TransactionReport,
};

/// All Indexer state. In-memory only; a restart clears the index, the
/// reputation table, and the cache.
#[derive(Default)]
pub struct IndexerState {
    /// capability -> DIDs, insertion-ordered, no duplicates.
    index: HashMap<String, Vec<String>>,
    reputation: ReputationTable,
    cache: HashMap<String, CachedRecord>,
}

impl IndexerState {
    /// Union-merge `capabilities` under `agent_id`. Existing memberships
    /// are preserved; order of first registration is kept.
    pub fn register(&mut self, agent_id: &str, capabilities: &[String]) {
        for capability in capabilities {
            let members = self.index.entry(capability.clone()).or_default();
            if !members.iter().any(|m| m == agent_id) {
                members.push(agent_id.to_string());
            }
        }
    }

    /// DIDs advertising `capability`, possibly empty.
    pub fn search(&self, capability: &str) -> Vec<String> {
        self.index.get(capability).cloned().unwrap_or_default()
    }

    pub fn report(&mut self, report: &TransactionReport) {
        self.reputation
            .record(&report.agent_id, report.success, report.response_time_ms);
    }

    /// Stats for each requested DID, fresh stats for unknown ones.
    pub fn reputations(&self, agent_ids: &[String]) -> HashMap<String, ReputationStats> {
        agent_ids
            .iter()
            .map(|id| (id.clone(), self.reputation.snapshot(id)))
            .collect()
    }

    pub fn cache_put(&mut self, record: CachedRecord) {
        self.cache.insert(record.did.clone(), record);
    }

    pub fn cache_get(&self, did: &str) -> Option<CachedRecord> {
        self.cache.get(did).cloned()
    }
}

pub type SharedState = Arc<RwLock<IndexerState>>;

/// Build the Indexer router over `state`.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/register_capabilities", post(register_capabilities))
        .route("/report", post(report_transaction))
        .route("/search", get(search_by_capability))
        .route("/get_reputations", post(get_reputations))
        .route("/publish_record", post(publish_record))
        .route("/discover/:did", get(discover))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and run the Indexer until the process is stopped.
pub async fn serve(host: &str, port: u16) -> Result<()> {
    let state: SharedState = Arc::new(RwLock::new(IndexerState::default()));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind Indexer on {}:{}", host, port))?;
    info!("Indexer listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .await
        .context("Indexer server exited")
}

// ─── Handlers ────────────────────────────────────────────────────

async fn register_capabilities(
    State(state): State<SharedState>,
    Json(reg): Json<CapabilityRegistration>,
) -> impl IntoResponse {
    let mut state = state.write().await;
    state.register(&reg.agent_id, &reg.capabilities);
    info!(
        "Registered capabilities for {}: {:?}",
        reg.agent_id, reg.capabilities
    );

    (
        StatusCode::CREATED,
        Json(json!({"status": "success", "agent_id": reg.agent_id})),
    )
}

async fn report_transaction(
    State(state): State<SharedState>,
    Json(report): Json<TransactionReport>,
) -> impl IntoResponse {
    let mut state = state.write().await;
    state.report(&report);
    let stats = state.reputations(std::slice::from_ref(&report.agent_id));
    if let Some(stats) = stats.get(&report.agent_id) {
        info!(
            "Updated stats for {}: {}/{} ok, avg {:.1} ms, score {:.2}",
            report.agent_id,
            stats.successes,
            stats.count,
            stats.avg_response_time_ms,
            stats.reputation_score
        );
    }

    Json(json!({"status": "reputation_updated"}))
}

#[derive(Deserialize)]
struct SearchParams {
    capability: String,
}

async fn search_by_capability(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<String>> {
    let state = state.read().await;
    let matches = state.search(&params.capability);
    if !matches.is_empty() {
        info!(
            "Found {} agents with capability '{}'",
            matches.len(),
            params.capability
        );
    }
    Json(matches)
}

async fn get_reputations(
    State(state): State<SharedState>,
    Json(req): Json<ReputationRequest>,
) -> Json<ReputationResponse> {
    let state = state.read().await;
    Json(ReputationResponse {
        reputations: state.reputations(&req.agent_ids),
    })
}

async fn publish_record(
    State(state): State<SharedState>,
    Json(record): Json<CachedRecord>,
) -> impl IntoResponse {
    let did = record.did.clone();
    let mut state = state.write().await;
    state.cache_put(record);
    info!("Cached record for {}", did);

    (
        StatusCode::CREATED,
        Json(json!({"status": "cached", "did": did})),
    )
}

async fn discover(
    State(state): State<SharedState>,
    Path(did): Path<String>,
) -> impl IntoResponse {
    let state = state.read().await;
    match state.cache_get(&did) {
        Some(record) => (StatusCode::OK, Json(json!(record))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("{} not found in cache", did)})),
        ),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(did: &str, endpoint: &str) -> CachedRecord {
        CachedRecord {
            did: did.to_string(),
            endpoint: endpoint.to_string(),
            public_key_pem: "PEM".to_string(),
            capabilities: vec!["echo".to_string()],
            price: 1.0,
        }
    }

    #[test]
    fn test_register_is_union_merge_without_duplicates() {
        let mut state = IndexerState::default();
        state.register("did:a", &["x".to_string(), "y".to_string()]);
        state.register("did:b", &["x".to_string()]);
        state.register("did:a", &["x".to_string(), "z".to_string()]);

        assert_eq!(state.search("x"), vec!["did:a", "did:b"]);
        assert_eq!(state.search("y"), vec!["did:a"]);
        assert_eq!(state.search("z"), vec!["did:a"]);
    }

    #[test]
    fn test_search_unknown_capability_is_empty() {
        let state = IndexerState::default();
        assert!(state.search("nope").is_empty());
    }

    #[test]
    fn test_reputations_default_for_unknown() {
        let mut state = IndexerState::default();
        state.report(&TransactionReport {
            agent_id: "did:a".to_string(),
            success: true,
            response_time_ms: 100.0,
        });

        let stats = state.reputations(&["did:a".to_string(), "did:b".to_string()]);
        assert_eq!(stats["did:a"].count, 1);
        assert_eq!(stats["did:b"].count, 0);
        assert_eq!(stats["did:b"].reputation_score, 5.0);
    }

    #[test]
    fn test_cache_round_trip() {
        let mut state = IndexerState::default();
        state.cache_put(cached("did:a", "http://a"));

        assert_eq!(state.cache_get("did:a").unwrap().endpoint, "http://a");
        assert!(state.cache_get("did:b").is_none());
    }

    #[test]
    fn test_cache_republish_overwrites() {
        let mut state = IndexerState::default();
        state.cache_put(cached("did:a", "http://old"));
        state.cache_put(cached("did:a", "http://new"));

        assert_eq!(state.cache_get("did:a").unwrap().endpoint, "http://new");
    }
}
