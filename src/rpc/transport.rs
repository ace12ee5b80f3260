//! Outbound RPC Transport
//!
//! Resolves a target through the record registry, seals the message body
//! into a signed envelope, POSTs it to the target's `/invoke` endpoint,
//! and reports the outcome to the reputation bureau whether the call
//! succeeded or not. Report failures never propagate to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Error;
use crate::identity::keystore::Keypair;
use crate::identity::signing;
use crate::registry::{IndexerClient, RecordRegistry};
use crate::types::{canonical_json, Payload, SignedEnvelope};

/// Deadline for an outbound `/invoke` call.
const INVOKE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RpcTransport {
    keypair: Arc<Keypair>,
    records: RecordRegistry,
    indexer: IndexerClient,
    http: Client,
}

impl RpcTransport {
    pub fn new(keypair: Arc<Keypair>, records: RecordRegistry, indexer: IndexerClient) -> Self {
        Self {
            keypair,
            records,
            indexer,
            http: Client::new(),
        }
    }

    /// Send a signed message to `target_did` and return the decoded JSON
    /// response. The transaction outcome (including failures past target
    /// resolution) is reported to the Indexer with the measured wall
    /// latency, best-effort.
    pub async fn send(&self, target_did: &str, body: Value) -> Result<Value, Error> {
        debug!("Sending message from {} to {}", self.keypair.did(), target_did);

        let target = self.records.fetch(target_did).await.ok_or_else(|| {
            Error::Discovery(format!("failed to resolve or verify {}", target_did))
        })?;

        let started = Instant::now();
        let result = self.invoke(&target.endpoint, body).await;
        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        if let Err(e) = self
            .indexer
            .report(target_did, result.is_ok(), response_time_ms)
            .await
        {
            warn!("Dropping transaction report for {}: {}", target_did, e);
        }

        result
    }

    /// Build the signed envelope for `body` with a fresh timestamp.
    pub fn seal(&self, body: Value) -> Result<SignedEnvelope, Error> {
        let payload = Payload {
            sender_did: self.keypair.did().to_string(),
            body,
            timestamp: unix_now(),
        };
        let payload_json = canonical_json(&payload)
            .map_err(|e| Error::Transport(format!("payload encoding failed: {}", e)))?;
        let signature = signing::sign(&self.keypair, payload_json.as_bytes())?;

        Ok(SignedEnvelope {
            payload: BASE64.encode(payload_json.as_bytes()),
            signature: BASE64.encode(&signature),
        })
    }

    async fn invoke(&self, endpoint: &str, body: Value) -> Result<Value, Error> {
        let envelope = self.seal(body)?;
        let url = format!("{}/invoke", endpoint);

        let response = self
            .http
            .post(&url)
            .timeout(INVOKE_TIMEOUT)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("invoke failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "invoke returned {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Transport(format!("invoke response non-JSON: {}", e)))
    }
}

/// Current Unix time in seconds, sub-second precision.
fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::keystore::load_or_create;
    use crate::overlay::MemoryOverlay;

    fn test_transport(dir: &tempfile::TempDir) -> RpcTransport {
        let keypair = Arc::new(load_or_create(&dir.path().join("key.pem")).unwrap());
        let records = RecordRegistry::new(Arc::new(MemoryOverlay::new()), None);
        let indexer = IndexerClient::new("http://127.0.0.1:1");
        RpcTransport::new(keypair, records, indexer)
    }

    #[test]
    fn test_sealed_envelope_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let transport = test_transport(&dir);

        let envelope = transport.seal(serde_json::json!({"x": 1})).unwrap();

        let payload_bytes = BASE64.decode(&envelope.payload).unwrap();
        let signature = BASE64.decode(&envelope.signature).unwrap();
        assert!(signing::verify(
            transport.keypair.public_key_pem(),
            &payload_bytes,
            &signature
        ));

        let payload: Payload = serde_json::from_slice(&payload_bytes).unwrap();
        assert_eq!(payload.sender_did, transport.keypair.did());
        assert_eq!(payload.body, serde_json::json!({"x": 1}));
        assert!(payload.timestamp > 0.0);
    }

    #[test]
    fn test_sealed_payload_is_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let transport = test_transport(&dir);

        let envelope = transport
            .seal(serde_json::json!({"zz": 1, "aa": 2}))
            .unwrap();
        let payload_json = String::from_utf8(BASE64.decode(&envelope.payload).unwrap()).unwrap();

        // Keys sorted at every level, envelope fields in canonical order.
        let body_pos = payload_json.find("\"body\"").unwrap();
        let sender_pos = payload_json.find("\"sender_did\"").unwrap();
        let ts_pos = payload_json.find("\"timestamp\"").unwrap();
        assert!(body_pos < sender_pos && sender_pos < ts_pos);
        assert!(payload_json.find("\"aa\"").unwrap() < payload_json.find("\"zz\"").unwrap());
    }

    #[test]
    fn test_base64_round_trip() {
        let raw: Vec<u8> = (0u8..=255).collect();
        assert_eq!(BASE64.decode(BASE64.encode(&raw)).unwrap(), raw);
    }
}
