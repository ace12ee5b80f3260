//! Ranking Engine
//!
//! The candidate-gather / normalize / score / select pipeline. Record
//! fetches fan out concurrently and join with a single batched reputation
//! request; candidates whose records cannot be fetched and verified are
//! dropped before scoring. Selection is deterministic given identical
//! inputs, with ties resolved to the first candidate in Indexer order.

use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::Error;
use crate::registry::{IndexerClient, RecordRegistry};
use crate::types::{AgentRecord, RankingPolicy};

/// A verified candidate ready for scoring.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub did: String,
    pub price: f64,
    pub reputation: f64,
}

/// Utility of each candidate under `policy`. Prices are min-max
/// normalized inverted (cheaper is better), reputations min-max
/// normalized directly; a dimension that is uniform across the set
/// scores 1 for everyone.
pub fn score_candidates(candidates: &[Candidate], policy: &RankingPolicy) -> Vec<f64> {
    let min_price = candidates.iter().map(|c| c.price).fold(f64::INFINITY, f64::min);
    let max_price = candidates.iter().map(|c| c.price).fold(f64::NEG_INFINITY, f64::max);
    let min_rep = candidates.iter().map(|c| c.reputation).fold(f64::INFINITY, f64::min);
    let max_rep = candidates.iter().map(|c| c.reputation).fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            let price_score = if max_price == min_price {
                1.0
            } else {
                1.0 - (c.price - min_price) / (max_price - min_price)
            };
            let rep_score = if max_rep == min_rep {
                1.0
            } else {
                (c.reputation - min_rep) / (max_rep - min_rep)
            };
            price_score * policy.price + rep_score * policy.reputation
        })
        .collect()
}

/// Index of the winning candidate, or `None` for an empty set. Equal
/// utilities keep the earliest candidate.
pub fn pick_winner(candidates: &[Candidate], policy: &RankingPolicy) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    if candidates.len() == 1 {
        return Some(0);
    }

    let utilities = score_candidates(candidates, policy);
    let mut winner = 0;
    for (i, utility) in utilities.iter().enumerate() {
        debug!(
            "Candidate {}: price={:.2}, rep={:.2}, utility={:.3}",
            candidates[i].did, candidates[i].price, candidates[i].reputation, utility
        );
        if *utility > utilities[winner] {
            winner = i;
        }
    }
    Some(winner)
}

pub struct RankingEngine {
    indexer: IndexerClient,
    records: RecordRegistry,
}

impl RankingEngine {
    pub fn new(indexer: IndexerClient, records: RecordRegistry) -> Self {
        Self { indexer, records }
    }

    /// Pick the best DID offering `capability` under `policy`.
    pub async fn select(&self, capability: &str, policy: &RankingPolicy) -> Result<String, Error> {
        let dids = self.indexer.search(capability).await?;
        if dids.is_empty() {
            return Err(Error::NoCandidates {
                capability: capability.to_string(),
            });
        }
        debug!("Found {} candidates for '{}'", dids.len(), capability);

        // Record fetches fan out while the batched reputation read is in
        // flight; one slow fetch bounds the whole gather.
        let (records, reputations) = tokio::join!(
            self.fetch_records(&dids),
            self.indexer.get_reputations(&dids),
        );
        let reputations = reputations?;

        let mut candidates = Vec::new();
        for (did, record) in dids.iter().zip(records) {
            match record {
                Some(record) => {
                    let reputation = reputations
                        .get(did)
                        .map(|s| s.reputation_score)
                        .unwrap_or(5.0);
                    candidates.push(Candidate {
                        did: did.clone(),
                        price: record.price,
                        reputation,
                    });
                }
                None => debug!("Discarding unverified candidate {}", did),
            }
        }

        if candidates.is_empty() {
            return Err(Error::NoVerifiedCandidates {
                capability: capability.to_string(),
            });
        }

        // The set is non-empty here, so a winner always exists.
        let winner = pick_winner(&candidates, policy).unwrap_or(0);
        let did = candidates[winner].did.clone();
        info!("Selected {} for capability '{}'", did, capability);
        Ok(did)
    }

    /// Fetch each DID's record concurrently, preserving input order so
    /// later tie-breaking stays stable.
    async fn fetch_records(&self, dids: &[String]) -> Vec<Option<AgentRecord>> {
        let mut set = JoinSet::new();
        for (i, did) in dids.iter().enumerate() {
            let registry = self.records.clone();
            let did = did.clone();
            set.spawn(async move { (i, registry.fetch(&did).await) });
        }

        let mut results: Vec<Option<AgentRecord>> = vec![None; dids.len()];
        while let Some(joined) = set.join_next().await {
            if let Ok((i, record)) = joined {
                results[i] = record;
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(did: &str, price: f64, reputation: f64) -> Candidate {
        Candidate {
            did: did.to_string(),
            price,
            reputation,
        }
    }

    #[test]
    fn test_price_heavy_policy_prefers_cheap() {
        let candidates = vec![
            candidate("did:a", 10.0, 4.0),
            candidate("did:b", 2.0, 2.0),
        ];
        let policy = RankingPolicy {
            price: 0.9,
            reputation: 0.1,
        };

        let utilities = score_candidates(&candidates, &policy);
        assert!((utilities[0] - 0.1).abs() < 1e-12);
        assert!((utilities[1] - 0.9).abs() < 1e-12);
        assert_eq!(pick_winner(&candidates, &policy), Some(1));
    }

    #[test]
    fn test_uniform_price_decides_on_reputation() {
        let candidates = vec![
            candidate("did:a", 5.0, 4.0),
            candidate("did:b", 5.0, 2.0),
        ];
        // Any policy: price scores collapse to 1 for both.
        let policy = RankingPolicy {
            price: 0.99,
            reputation: 0.01,
        };
        assert_eq!(pick_winner(&candidates, &policy), Some(0));
    }

    #[test]
    fn test_uniform_reputation_decides_on_price() {
        let candidates = vec![
            candidate("did:a", 9.0, 3.0),
            candidate("did:b", 1.0, 3.0),
            candidate("did:c", 4.0, 3.0),
        ];
        let policy = RankingPolicy::default();
        assert_eq!(pick_winner(&candidates, &policy), Some(1));
    }

    #[test]
    fn test_tie_keeps_first_in_indexer_order() {
        let candidates = vec![
            candidate("did:a", 5.0, 3.0),
            candidate("did:b", 5.0, 3.0),
        ];
        assert_eq!(pick_winner(&candidates, &RankingPolicy::default()), Some(0));
    }

    #[test]
    fn test_single_candidate_wins_outright() {
        let candidates = vec![candidate("did:a", 123.0, 0.1)];
        assert_eq!(pick_winner(&candidates, &RankingPolicy::default()), Some(0));
    }

    #[test]
    fn test_empty_set_has_no_winner() {
        assert_eq!(pick_winner(&[], &RankingPolicy::default()), None);
    }

    #[test]
    fn test_weights_are_used_as_provided() {
        // Weights that do not sum to 1 still rank consistently.
        let candidates = vec![
            candidate("did:a", 1.0, 1.0),
            candidate("did:b", 2.0, 5.0),
        ];
        let policy = RankingPolicy {
            price: 3.0,
            reputation: 1.0,
        };

        // a: price 1.0 * 3 + rep 0.0 * 1 = 3.0; b: 0.0 * 3 + 1.0 * 1 = 1.0.
        let utilities = score_candidates(&candidates, &policy);
        assert!((utilities[0] - 3.0).abs() < 1e-12);
        assert!((utilities[1] - 1.0).abs() < 1e-12);
        assert_eq!(pick_winner(&candidates, &policy), Some(0));
    }
}
