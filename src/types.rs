//! Agent Web - Type Definitions
//!
//! Shared wire and domain types for the agent fabric. Field names on the
//! serde-visible types are part of the HTTP wire protocol and must not be
//! renamed.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Canonical Encoding ──────────────────────────────────────────

/// Canonical JSON: sorted keys at every level, no insignificant
/// whitespace, shortest round-trip doubles. Signatures cover exactly
/// these bytes, so both sides must produce them bit-identically.
pub fn canonical_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    // Objects in `serde_json::Value` are backed by a sorted map, so a
    // round-trip through `Value` yields key-sorted output.
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&value)
}

// ─── Signed RPC ──────────────────────────────────────────────────

/// The `{payload, signature}` wire shape of a signed RPC. Both fields are
/// base64 of raw bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub payload: String,
    pub signature: String,
}

/// The signed payload carried inside an envelope. Canonically encoded as
/// JSON with sorted keys; the signature covers those exact bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payload {
    pub sender_did: String,
    pub body: Value,
    /// Unix seconds. Carried for replay policies at higher layers; the
    /// listener does not enforce a window.
    pub timestamp: f64,
}

// ─── Directory Records ───────────────────────────────────────────

/// The directory entry published to the overlay under the agent's DID.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentRecord {
    /// X.509 SubjectPublicKeyInfo PEM. Its SHA-256 digest must equal the
    /// DID the record is stored under.
    pub public_key_pem: String,
    pub endpoint: String,
    pub price: f64,
    pub payment_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,
}

/// The record shape held by the Indexer's fallback cache. Unlike the
/// overlay record, capabilities are required here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedRecord {
    pub did: String,
    pub endpoint: String,
    pub public_key_pem: String,
    pub capabilities: Vec<String>,
    pub price: f64,
}

impl CachedRecord {
    /// View the cached record as an overlay-style record.
    pub fn to_agent_record(&self, payment_method: &str) -> AgentRecord {
        AgentRecord {
            public_key_pem: self.public_key_pem.clone(),
            endpoint: self.endpoint.clone(),
            price: self.price,
            payment_method: payment_method.to_string(),
            capabilities: Some(self.capabilities.clone()),
        }
    }
}

// ─── Reputation ──────────────────────────────────────────────────

/// Per-DID reputation statistics as they appear on the wire. The derived
/// fields (`success_rate` as a percentage, `avg_response_time_ms`,
/// `reputation_score`) are filled in by the Indexer; raw counters always
/// satisfy `count == successes + failures`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationStats {
    pub successes: u64,
    pub failures: u64,
    pub total_response_time_ms: f64,
    pub count: u64,
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub reputation_score: f64,
}

impl Default for ReputationStats {
    fn default() -> Self {
        Self {
            successes: 0,
            failures: 0,
            total_response_time_ms: 0.0,
            count: 0,
            success_rate: 0.0,
            avg_response_time_ms: 0.0,
            // A DID nobody has reported on yet scores the maximum.
            reputation_score: 5.0,
        }
    }
}

// ─── Indexer Wire Bodies ─────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapabilityRegistration {
    pub agent_id: String,
    pub capabilities: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionReport {
    pub agent_id: String,
    pub success: bool,
    pub response_time_ms: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReputationRequest {
    pub agent_ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReputationResponse {
    pub reputations: HashMap<String, ReputationStats>,
}

// ─── Ranking ─────────────────────────────────────────────────────

/// Weights applied when ranking candidates. They are used as provided and
/// need not sum to 1.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RankingPolicy {
    pub price: f64,
    pub reputation: f64,
}

impl Default for RankingPolicy {
    fn default() -> Self {
        Self {
            price: 0.6,
            reputation: 0.4,
        }
    }
}

// ─── Configuration ───────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the Indexer service.
    pub registry_url: String,
    /// Filesystem path for key persistence. The key file is the identity.
    pub key_file: String,
    pub default_policy: RankingPolicy,
    /// When true, publish to and discover from the Indexer's record cache
    /// in addition to the overlay.
    pub fallback_discovery_enabled: bool,
    pub http_host: String,
    pub http_port: u16,
    pub dht_host: String,
    pub dht_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_node: Option<(String, u16)>,
    /// Public URL advertised in the agent record. Derived from the HTTP
    /// listener address when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub capabilities: Vec<String>,
    pub price: f64,
    pub payment_method: String,
}

/// Returns a default `AgentConfig`. Fields that have no sensible default
/// are left empty so callers can override them.
pub fn default_agent_config() -> AgentConfig {
    AgentConfig {
        registry_url: "http://127.0.0.1:8000".to_string(),
        key_file: "~/.agentweb/agent_key.pem".to_string(),
        default_policy: RankingPolicy::default(),
        fallback_discovery_enabled: false,
        http_host: "127.0.0.1".to_string(),
        http_port: 8001,
        dht_host: "0.0.0.0".to_string(),
        dht_port: 8468,
        bootstrap_node: None,
        endpoint: None,
        capabilities: Vec::new(),
        price: 0.0,
        payment_method: "none".to_string(),
    }
}

// ─── Runtime Phases ──────────────────────────────────────────────

/// Lifecycle phases of a running agent process. Transitions only move
/// forward; a fatal error in an early phase terminates the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RuntimePhase {
    Initializing,
    KeyReady,
    OverlayJoined,
    Listening,
    Registered,
    Serving,
    Shutdown,
}

impl std::fmt::Display for RuntimePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RuntimePhase::Initializing => "INITIALIZING",
            RuntimePhase::KeyReady => "KEY_READY",
            RuntimePhase::OverlayJoined => "OVERLAY_JOINED",
            RuntimePhase::Listening => "LISTENING",
            RuntimePhase::Registered => "REGISTERED",
            RuntimePhase::Serving => "SERVING",
            RuntimePhase::Shutdown => "SHUTDOWN",
        };
        write!(f, "{}", name)
    }
}

// ─── Message Handler ─────────────────────────────────────────────

/// Trait implemented by the application logic behind an agent's inbound
/// endpoint. The listener verifies sender identity and signature before
/// this is invoked, and awaits the returned future before responding.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, sender_did: &str, body: Value) -> anyhow::Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reputation_stats_score_maximum() {
        let stats = ReputationStats::default();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.reputation_score, 5.0);
    }

    #[test]
    fn test_default_policy_weights() {
        let policy = RankingPolicy::default();
        assert_eq!(policy.price, 0.6);
        assert_eq!(policy.reputation, 0.4);
    }

    #[test]
    fn test_reputation_stats_partial_deserialization() {
        // A bare counters object fills derived fields from defaults.
        let stats: ReputationStats =
            serde_json::from_str(r#"{"successes": 1, "count": 1}"#).unwrap();
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.reputation_score, 5.0);
    }

    #[test]
    fn test_runtime_phases_are_ordered() {
        assert!(RuntimePhase::Initializing < RuntimePhase::KeyReady);
        assert!(RuntimePhase::KeyReady < RuntimePhase::OverlayJoined);
        assert!(RuntimePhase::OverlayJoined < RuntimePhase::Listening);
        assert!(RuntimePhase::Listening < RuntimePhase::Registered);
        assert!(RuntimePhase::Registered < RuntimePhase::Serving);
        assert!(RuntimePhase::Serving < RuntimePhase::Shutdown);
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let payload = Payload {
            sender_did: "did:agentweb:ab".to_string(),
            body: serde_json::json!({"zeta": 1, "alpha": {"nested_z": 2, "nested_a": 3}}),
            timestamp: 1700000000.5,
        };

        let json = canonical_json(&payload).unwrap();
        assert_eq!(
            json,
            r#"{"body":{"alpha":{"nested_a":3,"nested_z":2},"zeta":1},"sender_did":"did:agentweb:ab","timestamp":1700000000.5}"#
        );
    }

    #[test]
    fn test_canonical_json_round_trips() {
        let original = serde_json::json!({
            "s": "text",
            "i": 42,
            "f": 0.1,
            "b": true,
            "n": null,
            "a": [1, "two", {"three": 3.0}],
        });

        let reparsed: Value =
            serde_json::from_str(&canonical_json(&original).unwrap()).unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn test_agent_record_capabilities_optional_on_wire() {
        let json = r#"{"public_key_pem":"PEM","endpoint":"http://a","price":1.0,"payment_method":"none"}"#;
        let record: AgentRecord = serde_json::from_str(json).unwrap();
        assert!(record.capabilities.is_none());

        let out = serde_json::to_string(&record).unwrap();
        assert!(!out.contains("capabilities"));
    }
}
