//! Indexer Client
//!
//! Typed HTTP client for the central Indexer: capability registration and
//! search, batch reputation reads, transaction reports, and the fallback
//! record cache used when the overlay cannot be relied on.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::Error;
use crate::types::{
    CachedRecord, CapabilityRegistration, ReputationRequest, ReputationResponse, ReputationStats,
    TransactionReport,
};

/// Deadline for reputation reports and cache lookups. These are
/// best-effort side channels and must not stall the main path.
const SIDE_CHANNEL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct IndexerClient {
    registry_url: String,
    http: Client,
}

impl IndexerClient {
    /// Create a client pointed at the Indexer's base URL.
    pub fn new(registry_url: impl Into<String>) -> Self {
        Self {
            registry_url: registry_url.into(),
            http: Client::new(),
        }
    }

    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    /// Register this agent's capabilities in the index. Membership is
    /// union-merged on the server side.
    pub async fn register_capabilities(
        &self,
        agent_id: &str,
        capabilities: &[String],
    ) -> Result<()> {
        let url = format!("{}/register_capabilities", self.registry_url);
        let body = CapabilityRegistration {
            agent_id: agent_id.to_string(),
            capabilities: capabilities.to_vec(),
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach Indexer for capability registration")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Indexer returned {}: {}", status, text);
        }

        debug!("Registered {} capabilities for {}", capabilities.len(), agent_id);
        Ok(())
    }

    /// Look up the DIDs currently advertising `capability`. An empty list
    /// is a valid answer, not an error.
    pub async fn search(&self, capability: &str) -> Result<Vec<String>, Error> {
        let url = format!(
            "{}/search?capability={}",
            self.registry_url,
            urlencoding::encode(capability)
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("search request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Discovery(format!(
                "search returned {}",
                response.status()
            )));
        }

        response
            .json::<Vec<String>>()
            .await
            .map_err(|e| Error::Discovery(format!("search returned non-JSON: {}", e)))
    }

    /// Fetch reputation stats for a batch of DIDs in one request. Unknown
    /// DIDs come back with fresh stats.
    pub async fn get_reputations(
        &self,
        agent_ids: &[String],
    ) -> Result<HashMap<String, ReputationStats>, Error> {
        let url = format!("{}/get_reputations", self.registry_url);
        let body = ReputationRequest {
            agent_ids: agent_ids.to_vec(),
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("reputation request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Discovery(format!(
                "reputation request returned {}",
                response.status()
            )));
        }

        let parsed: ReputationResponse = response
            .json()
            .await
            .map_err(|e| Error::Discovery(format!("reputation response non-JSON: {}", e)))?;

        Ok(parsed.reputations)
    }

    /// Report a transaction outcome for `agent_id`. Callers swallow the
    /// error; a lost report only costs one reputation sample.
    pub async fn report(
        &self,
        agent_id: &str,
        success: bool,
        response_time_ms: f64,
    ) -> Result<(), Error> {
        let url = format!("{}/report", self.registry_url);
        let body = TransactionReport {
            agent_id: agent_id.to_string(),
            success,
            response_time_ms,
        };

        let response = self
            .http
            .post(&url)
            .timeout(SIDE_CHANNEL_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Reporting(format!("report request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Reporting(format!(
                "report returned {}",
                response.status()
            )));
        }

        debug!("Reported transaction for {}: success={}", agent_id, success);
        Ok(())
    }

    /// Publish a full record to the Indexer's cache (fallback discovery).
    pub async fn publish_record(&self, record: &CachedRecord) -> Result<()> {
        let url = format!("{}/publish_record", self.registry_url);

        let response = self
            .http
            .post(&url)
            .json(record)
            .send()
            .await
            .context("Failed to publish record to Indexer cache")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Indexer cache returned {}: {}", status, text);
        }

        Ok(())
    }

    /// Look up a record in the Indexer's cache. `None` on 404. The caller
    /// must still verify the record's identity binding.
    pub async fn discover(&self, did: &str) -> Result<Option<CachedRecord>> {
        let url = format!("{}/discover/{}", self.registry_url, did);

        let response = self
            .http
            .get(&url)
            .timeout(SIDE_CHANNEL_TIMEOUT)
            .send()
            .await
            .context("Failed to reach Indexer cache")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("Indexer cache returned {}", response.status());
        }

        let record: CachedRecord = response
            .json()
            .await
            .context("Failed to parse cached record")?;
        Ok(Some(record))
    }
}
