//! Indexer Module
//!
//! The central auxiliary registry: capability-to-DID index, reputation
//! bureau, and the record cache that backs fallback discovery. All state
//! is in-memory and resets on restart; agents re-register on startup.

pub mod reputation;
pub mod service;

pub use reputation::ReputationTable;
pub use service::{router, serve, IndexerState, SharedState};
