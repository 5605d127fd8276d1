// src/scoring/mod.rs
pub mod oracle;
pub mod parse;

use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;

use crate::error::ScoringError;
use crate::scoring::oracle::DynOracle;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "scoring_failures_total",
            "Batches that degraded to all-zero scores."
        );
        describe_counter!(
            "scoring_discarded_lines_total",
            "Oracle response lines dropped as malformed or out of range."
        );
        describe_histogram!("scoring_latency_ms", "Oracle round-trip time in milliseconds.");
    });
}

/// Scores of one batch plus how they were obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchScores {
    pub scores: Vec<f64>,
    pub degraded: bool,
    pub elapsed_ms: u64,
}

/// Sends one batch to the oracle and parses its answer.
///
/// `score_batch` never fails: any oracle error or timeout yields a zero
/// vector of the batch's length. No retries.
#[derive(Clone)]
pub struct ScoreRequestBatcher {
    oracle: DynOracle,
    timeout: Duration,
}

impl ScoreRequestBatcher {
    pub fn new(oracle: DynOracle, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    pub fn oracle_name(&self) -> &'static str {
        self.oracle.name()
    }

    pub async fn score_batch(&self, texts: &[String]) -> BatchScores {
        ensure_metrics_described();
        if texts.is_empty() {
            return BatchScores {
                scores: Vec::new(),
                degraded: false,
                elapsed_ms: 0,
            };
        }

        let t0 = Instant::now();
        let res = match tokio::time::timeout(self.timeout, self.oracle.complete(texts)).await {
            Ok(r) => r,
            Err(_) => Err(ScoringError::Timeout(self.timeout)),
        };
        let elapsed_ms = t0.elapsed().as_millis() as u64;
        histogram!("scoring_latency_ms").record(elapsed_ms as f64);

        match res {
            Ok(raw) => {
                let parsed = parse::parse_scores(&raw, texts.len());
                tracing::info!(
                    target: "scoring",
                    oracle = self.oracle.name(),
                    matched = parsed.matched,
                    expected = texts.len(),
                    elapsed_ms,
                    "batch scored"
                );
                BatchScores {
                    scores: parsed.scores,
                    degraded: false,
                    elapsed_ms,
                }
            }
            Err(e) => {
                tracing::error!(
                    target: "scoring",
                    oracle = self.oracle.name(),
                    error = %e,
                    count = texts.len(),
                    "scoring failed; using neutral scores"
                );
                counter!("scoring_failures_total").increment(1);
                BatchScores {
                    scores: vec![0.0; texts.len()],
                    degraded: true,
                    elapsed_ms,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::oracle::{DisabledOracle, MockOracle, ScoreOracle};
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct SlowOracle;

    #[async_trait]
    impl ScoreOracle for SlowOracle {
        async fn complete(&self, _texts: &[String]) -> Result<String, ScoringError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("headline {i}")).collect()
    }

    #[tokio::test]
    async fn empty_batch_skips_the_oracle() {
        let b = ScoreRequestBatcher::new(Arc::new(DisabledOracle), Duration::from_secs(1));
        let out = b.score_batch(&[]).await;
        assert!(out.scores.is_empty());
        assert!(!out.degraded);
    }

    #[tokio::test]
    async fn parses_mock_answer() {
        let b = ScoreRequestBatcher::new(
            Arc::new(MockOracle::fixed(vec![0.6, -0.9])),
            Duration::from_secs(1),
        );
        let out = b.score_batch(&texts(3)).await;
        assert_eq!(out.scores, vec![0.6, -0.9, 0.0]);
        assert!(!out.degraded);
    }

    #[tokio::test]
    async fn oracle_error_degrades_to_zeros() {
        let b = ScoreRequestBatcher::new(Arc::new(DisabledOracle), Duration::from_secs(1));
        let out = b.score_batch(&texts(4)).await;
        assert_eq!(out.scores, vec![0.0; 4]);
        assert!(out.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_degrades_to_zeros() {
        let b = ScoreRequestBatcher::new(Arc::new(SlowOracle), Duration::from_secs(45));
        let out = b.score_batch(&texts(2)).await;
        assert_eq!(out.scores, vec![0.0, 0.0]);
        assert!(out.degraded);
    }
}
