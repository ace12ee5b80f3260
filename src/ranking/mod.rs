//! Ranking Module
//!
//! Picks a counterparty for a capability: gather candidates from the
//! Indexer, fetch and verify their records concurrently, batch-read
//! reputations, then score by the caller's price/reputation policy.

pub mod engine;

pub use engine::{pick_winner, score_candidates, Candidate, RankingEngine};
