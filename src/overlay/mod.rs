//! Overlay Module
//!
//! Abstract key-value overlay for agent records, keyed by DID. The
//! overlay is eventually consistent: a `get` may miss transiently even
//! for a key that was successfully `put`, and consumers must tolerate
//! that. The DHT node itself is an external collaborator; deployments
//! wire a Kademlia-backed client in through the `OverlayClient` trait.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryOverlay;

/// Put/get interface to the distributed record store. Keys are DIDs
/// (bounded at 256 bytes); values are JSON agent records.
#[async_trait]
pub trait OverlayClient: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Returns `None` on a miss. Misses carry no staleness guarantee.
    async fn get(&self, key: &str) -> Result<Option<String>>;
}
