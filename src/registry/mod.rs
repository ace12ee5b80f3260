//! Registry Module
//!
//! Clients for the two directories an agent talks to: the Indexer (HTTP
//! capability index, reputation bureau, and fallback record cache) and
//! the overlay record store, with identity verification on every fetch.

pub mod indexer_client;
pub mod records;

pub use indexer_client::IndexerClient;
pub use records::RecordRegistry;
