//! Reputation Bureau
//!
//! Per-DID success/failure/latency counters and the derived score. The
//! score combines success rate with a latency penalty and is clamped to
//! [0.1, 5.0]; a DID with no reports yet scores 5.0.

use std::collections::HashMap;

use crate::types::ReputationStats;

/// Average latency above this many milliseconds starts to cost score.
const LATENCY_GRACE_MS: f64 = 500.0;

/// Raw counters for one DID. Invariant: `count == successes + failures`.
#[derive(Clone, Debug, Default)]
struct Counters {
    successes: u64,
    failures: u64,
    total_response_time_ms: f64,
    count: u64,
}

impl Counters {
    fn record(&mut self, success: bool, response_time_ms: f64) {
        self.count += 1;
        self.total_response_time_ms += response_time_ms;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
    }

    fn snapshot(&self) -> ReputationStats {
        if self.count == 0 {
            return ReputationStats::default();
        }

        let rate = self.successes as f64 / self.count as f64;
        let avg = self.total_response_time_ms / self.count as f64;
        let time_penalty = ((avg - LATENCY_GRACE_MS) / 1000.0).max(0.0);
        let score = (rate * 5.0 - time_penalty).max(0.1);

        ReputationStats {
            successes: self.successes,
            failures: self.failures,
            total_response_time_ms: self.total_response_time_ms,
            count: self.count,
            success_rate: rate * 100.0,
            avg_response_time_ms: avg,
            reputation_score: score,
        }
    }
}

/// The reputation table. Owned exclusively by the Indexer service, which
/// serializes all mutation behind its state lock.
#[derive(Default)]
pub struct ReputationTable {
    counters: HashMap<String, Counters>,
}

impl ReputationTable {
    /// Fold one transaction report into `agent_id`'s counters.
    pub fn record(&mut self, agent_id: &str, success: bool, response_time_ms: f64) {
        self.counters
            .entry(agent_id.to_string())
            .or_default()
            .record(success, response_time_ms);
    }

    /// Current stats for `agent_id`; fresh stats for an unknown DID.
    pub fn snapshot(&self, agent_id: &str) -> ReputationStats {
        self.counters
            .get(agent_id)
            .map(Counters::snapshot)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DID: &str = "did:agentweb:ab";

    #[test]
    fn test_unknown_did_scores_maximum() {
        let table = ReputationTable::default();
        let stats = table.snapshot(DID);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.reputation_score, 5.0);
    }

    #[test]
    fn test_mixed_reports() {
        let mut table = ReputationTable::default();
        table.record(DID, true, 200.0);
        table.record(DID, false, 800.0);
        table.record(DID, true, 500.0);

        let stats = table.snapshot(DID);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.total_response_time_ms, 1500.0);
        assert!((stats.success_rate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.avg_response_time_ms, 500.0);
        // Average latency sits exactly at the grace bound: no penalty.
        assert!((stats.reputation_score - 10.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_latency_penalty() {
        let mut table = ReputationTable::default();
        table.record(DID, true, 1500.0);

        // rate 1.0 -> 5.0 base, minus (1500 - 500) / 1000 = 1.0.
        let stats = table.snapshot(DID);
        assert!((stats.reputation_score - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_floor() {
        let mut table = ReputationTable::default();
        for _ in 0..5 {
            table.record(DID, false, 10_000.0);
        }

        let stats = table.snapshot(DID);
        assert_eq!(stats.reputation_score, 0.1);
    }

    #[test]
    fn test_score_stays_in_bounds() {
        let mut table = ReputationTable::default();
        let samples = [
            (true, 0.0),
            (true, 50.0),
            (false, 250.0),
            (true, 900.0),
            (false, 4000.0),
            (true, 120.0),
        ];
        for (i, (success, rt)) in samples.iter().enumerate() {
            table.record(DID, *success, *rt);
            let stats = table.snapshot(DID);
            assert_eq!(stats.count as usize, i + 1);
            assert_eq!(stats.count, stats.successes + stats.failures);
            assert!(stats.reputation_score >= 0.1);
            assert!(stats.reputation_score <= 5.0);
        }
    }

    #[test]
    fn test_counters_are_per_did() {
        let mut table = ReputationTable::default();
        table.record(DID, false, 100.0);

        let other = table.snapshot("did:agentweb:cd");
        assert_eq!(other.count, 0);
        assert_eq!(other.reputation_score, 5.0);
    }
}
