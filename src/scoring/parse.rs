// src/scoring/parse.rs
//! Boundary adapter for free-text oracle output.
//!
//! Accepts lines of the form `<index>: <score>` (1-based index). Everything
//! else is dropped with a warning; indices never mentioned stay at `0.0`.

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+):\s*([-+]?\d*\.?\d+)\s*$").expect("score line regex"));

/// Outcome of parsing one response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScores {
    pub scores: Vec<f64>,
    pub matched: usize,
    pub discarded: usize,
}

/// Parse `response` for a batch of `n` texts. Never fails.
pub fn parse_scores(response: &str, n: usize) -> ParsedScores {
    let mut scores = vec![0.0; n];
    let mut matched = 0usize;
    let mut discarded = 0usize;

    for line in response.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let Some(caps) = RE_LINE.captures(line) else {
            tracing::warn!(target: "scoring", line, "discarding malformed oracle line");
            discarded += 1;
            continue;
        };
        let idx = caps[1].parse::<usize>().ok();
        let value = caps[2].parse::<f64>().ok();
        match (idx, value) {
            (Some(i), Some(v)) if (1..=n).contains(&i) => {
                scores[i - 1] = v.clamp(-1.0, 1.0);
                matched += 1;
            }
            (Some(i), Some(_)) => {
                tracing::warn!(target: "scoring", index = i, batch = n, "oracle index out of range");
                discarded += 1;
            }
            _ => {
                tracing::warn!(target: "scoring", line, "discarding unparsable oracle line");
                discarded += 1;
            }
        }
    }

    if discarded > 0 {
        counter!("scoring_discarded_lines_total").increment(discarded as u64);
    }
    if matched != n {
        tracing::warn!(
            target: "scoring",
            matched,
            expected = n,
            "oracle response did not cover every item"
        );
    }

    ParsedScores {
        scores,
        matched,
        discarded,
    }
}
