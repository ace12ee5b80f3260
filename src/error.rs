//! Error Taxonomy
//!
//! Crate-level error kinds for identity, discovery, ranking, and RPC.
//! Reporting failures are logged and swallowed at call sites; every
//! other kind surfaces to the initiating caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unreadable key material. Fatal at startup.
    #[error("key material error: {0}")]
    KeyMaterial(String),

    /// A fetched record's embedded public key does not hash to the
    /// identifier it was looked up under.
    #[error("identity mismatch for {did}")]
    IdentityMismatch { did: String },

    /// The Indexer is unreachable or returned an unusable response.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// No agents advertise the requested capability.
    #[error("no agents found with capability: {capability}")]
    NoCandidates { capability: String },

    /// Candidates were indexed but none survived record fetch and
    /// identity verification.
    #[error("no verified candidates for capability: {capability}")]
    NoVerifiedCandidates { capability: String },

    /// Outbound invoke failed: timeout, connection error, or non-2xx.
    #[error("transport error: {0}")]
    Transport(String),

    /// Inbound signature invalid or sender unresolvable.
    #[error("authentication failure: {0}")]
    Authentication(String),

    /// The user-supplied message handler failed.
    #[error("handler error: {0}")]
    Handler(String),

    /// The reputation endpoint could not be reached.
    #[error("reporting error: {0}")]
    Reporting(String),
}
