//! In-Memory Overlay
//!
//! Shared in-process map implementing `OverlayClient`. Stands in for a
//! Kademlia deployment when all agents run in one process (demos, tests),
//! and gives single-agent deployments a place to publish while discovery
//! runs through the Indexer's fallback cache.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::OverlayClient;

#[derive(Clone, Default)]
pub struct MemoryOverlay {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryOverlay {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OverlayClient for MemoryOverlay {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get() {
        let overlay = MemoryOverlay::new();
        overlay.put("did:agentweb:ab", "{}").await.unwrap();

        assert_eq!(
            overlay.get("did:agentweb:ab").await.unwrap().as_deref(),
            Some("{}")
        );
    }

    #[tokio::test]
    async fn test_miss_is_none() {
        let overlay = MemoryOverlay::new();
        assert!(overlay.get("did:agentweb:absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let overlay = MemoryOverlay::new();
        let other = overlay.clone();

        overlay.put("k", "v").await.unwrap();
        assert_eq!(other.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
