//! Record Registry
//!
//! Publishes and retrieves agent records through the overlay, with the
//! Indexer's record cache as an optional fallback path. Every fetch,
//! whichever store answered, verifies that the record's embedded public
//! key hashes to the DID it was looked up under; a record that fails that
//! check is treated as absent.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::identity::keystore::verify_did;
use crate::overlay::OverlayClient;
use crate::registry::IndexerClient;
use crate::types::{canonical_json, AgentRecord, CachedRecord};

#[derive(Clone)]
pub struct RecordRegistry {
    overlay: Arc<dyn OverlayClient>,
    fallback: Option<IndexerClient>,
}

impl RecordRegistry {
    /// Create a registry over `overlay`. When `fallback` is set, fetches
    /// that miss the overlay consult the Indexer's record cache, and
    /// publishes go to both stores.
    pub fn new(overlay: Arc<dyn OverlayClient>, fallback: Option<IndexerClient>) -> Self {
        Self { overlay, fallback }
    }

    /// Publish `record` to the overlay under `did` as canonical JSON. In
    /// fallback mode the record is also pushed to the Indexer cache; a
    /// cache push failure downgrades to overlay-only publication.
    pub async fn publish(&self, did: &str, record: &AgentRecord) -> Result<()> {
        let json = canonical_json(record).context("Failed to serialize agent record")?;
        self.overlay
            .put(did, &json)
            .await
            .context("Failed to publish record to overlay")?;
        debug!("Published record for {} to the overlay", did);

        if let Some(fallback) = &self.fallback {
            let cached = CachedRecord {
                did: did.to_string(),
                endpoint: record.endpoint.clone(),
                public_key_pem: record.public_key_pem.clone(),
                capabilities: record.capabilities.clone().unwrap_or_default(),
                price: record.price,
            };
            if let Err(e) = fallback.publish_record(&cached).await {
                warn!("Cache publish failed, proceeding with overlay only: {:#}", e);
            }
        }

        Ok(())
    }

    /// Fetch and verify the record for `did`. Returns `None` when the
    /// record is absent from every configured store, cannot be parsed, or
    /// fails identity verification.
    pub async fn fetch(&self, did: &str) -> Option<AgentRecord> {
        match self.overlay.get(did).await {
            Ok(Some(json)) => {
                if let Some(record) = self.parse_and_verify(did, &json) {
                    return Some(record);
                }
            }
            Ok(None) => debug!("Overlay miss for {}", did),
            Err(e) => warn!("Overlay lookup failed for {}: {:#}", did, e),
        }

        let fallback = self.fallback.as_ref()?;
        match fallback.discover(did).await {
            Ok(Some(cached)) => {
                let record = cached.to_agent_record("none");
                if verify_did(did, &record.public_key_pem) {
                    debug!("Found {} in Indexer cache", did);
                    Some(record)
                } else {
                    warn!(
                        "Security: cached record for {} embeds a key that does not match the DID",
                        did
                    );
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Cache lookup failed for {}: {:#}", did, e);
                None
            }
        }
    }

    fn parse_and_verify(&self, did: &str, json: &str) -> Option<AgentRecord> {
        let record: AgentRecord = match serde_json::from_str(json) {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to parse overlay record for {}: {}", did, e);
                return None;
            }
        };

        if !verify_did(did, &record.public_key_pem) {
            warn!(
                "Security: overlay record for {} embeds a key that does not match the DID",
                did
            );
            return None;
        }

        Some(record)
    }
}
