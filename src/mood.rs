//! # Mood Transform
//! Pure, deterministic compression of many per-headline scores into one
//! amplified mood value in `[-1, 1]`. No I/O; suitable for unit tests.
//!
//! Steps: mean → quadratic (or near-zero linear) amplification → extreme-share
//! boost → direction-imbalance term → clamp.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::classify::{Category, Strength};
use crate::ingest::types::Item;

/// Averages with magnitude at or below this use the linear branch.
const LINEAR_BAND: f64 = 0.05;
const LINEAR_SCALE: f64 = 3.5;
const QUADRATIC_SCALE: f64 = 8.0;

/// Scores at or beyond ±0.5 count as extreme.
const EXTREME_CUTOFF: f64 = 0.5;
const EXTREME_WEIGHT: f64 = 0.6;
/// Extra push once more than a quarter of the batch is extreme in one direction.
const EXTREME_SHARE: f64 = 0.25;
const EXTREME_SHARE_BONUS: f64 = 0.3;

/// Scores beyond ±0.1 count towards the direction imbalance.
const LEAN_CUTOFF: f64 = 0.1;
const IMBALANCE_MIN: i64 = 3;
const IMBALANCE_WEIGHT: f64 = 0.2;

/// Intermediate values of one transform, kept for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MoodBreakdown {
    pub base_avg: f64,
    pub scaled: f64,
    pub extreme_factor: f64,
    pub extreme_neg: usize,
    pub extreme_pos: usize,
    pub lean_neg: usize,
    pub lean_pos: usize,
    pub mood: f64,
}

impl MoodBreakdown {
    fn empty() -> Self {
        Self {
            base_avg: 0.0,
            scaled: 0.0,
            extreme_factor: 0.0,
            extreme_neg: 0,
            extreme_pos: 0,
            lean_neg: 0,
            lean_pos: 0,
            mood: 0.0,
        }
    }
}

/// Run the transform and return every intermediate value.
pub fn breakdown(scores: &[f64]) -> MoodBreakdown {
    if scores.is_empty() {
        return MoodBreakdown::empty();
    }
    let n = scores.len() as f64;

    let base_avg = scores.iter().sum::<f64>() / n;
    let scaled = if base_avg.abs() > LINEAR_BAND {
        base_avg.signum() * base_avg.powi(2) * QUADRATIC_SCALE
    } else {
        base_avg * LINEAR_SCALE
    };

    let extreme_neg = scores.iter().filter(|&&s| s <= -EXTREME_CUTOFF).count();
    let extreme_pos = scores.iter().filter(|&&s| s >= EXTREME_CUTOFF).count();

    let mut extreme_factor = 0.0;
    if extreme_neg > 0 {
        let share = extreme_neg as f64 / n;
        extreme_factor -= share * EXTREME_WEIGHT;
        if share > EXTREME_SHARE {
            extreme_factor -= EXTREME_SHARE_BONUS;
        }
    }
    if extreme_pos > 0 {
        let share = extreme_pos as f64 / n;
        extreme_factor += share * EXTREME_WEIGHT;
        if share > EXTREME_SHARE {
            extreme_factor += EXTREME_SHARE_BONUS;
        }
    }

    let lean_pos = scores.iter().filter(|&&s| s > LEAN_CUTOFF).count();
    let lean_neg = scores.iter().filter(|&&s| s < -LEAN_CUTOFF).count();
    let diff = lean_neg as i64 - lean_pos as i64;
    if diff.abs() >= IMBALANCE_MIN {
        // Sign follows (neg - pos), as in the calibrated production formula.
        extreme_factor += IMBALANCE_WEIGHT * diff.signum() as f64;
    }

    MoodBreakdown {
        base_avg,
        scaled,
        extreme_factor,
        extreme_neg,
        extreme_pos,
        lean_neg,
        lean_pos,
        mood: (scaled + extreme_factor).clamp(-1.0, 1.0),
    }
}

/// Mood score for a batch of per-item scores. Empty input yields `0.0`.
pub fn mood_score(scores: &[f64]) -> f64 {
    breakdown(scores).mood
}

/// One headline after scoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredItem {
    pub text: String,
    pub source: String,
    pub score: f64,
    pub strength: Strength,
}

/// Result of aggregating one scored batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodAnalysis {
    pub mood: f64,
    pub category: Category,
    pub analyzed_count: usize,
    pub distribution: BTreeMap<Strength, usize>,
    pub items: Vec<ScoredItem>,
}

/// Pair items with their scores, band each one, and transform the batch.
///
/// Items without a matching score (length mismatch) are not analyzed.
pub fn analyze(items: &[Item], scores: &[f64]) -> MoodAnalysis {
    let mut distribution = BTreeMap::new();
    let scored: Vec<ScoredItem> = items
        .iter()
        .zip(scores.iter())
        .map(|(item, &score)| {
            let strength = Strength::from_score(score);
            *distribution.entry(strength).or_insert(0) += 1;
            ScoredItem {
                text: item.text.clone(),
                source: item.source.clone(),
                score,
                strength,
            }
        })
        .collect();

    if scored.len() != items.len() {
        tracing::warn!(
            items = items.len(),
            scores = scores.len(),
            "score vector length does not match batch"
        );
    }

    let used: Vec<f64> = scored.iter().map(|s| s.score).collect();
    let b = breakdown(&used);
    if !used.is_empty() {
        tracing::info!(
            base_avg = b.base_avg,
            scaled = b.scaled,
            extreme_factor = b.extreme_factor,
            extreme_neg = b.extreme_neg,
            extreme_pos = b.extreme_pos,
            mood = b.mood,
            "mood transform"
        );
    }

    MoodAnalysis {
        mood: b.mood,
        category: Category::from_mood(b.mood),
        analyzed_count: scored.len(),
        distribution,
        items: scored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn item(text: &str) -> Item {
        Item {
            text: text.into(),
            source: "Test".into(),
            link: None,
        }
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(mood_score(&[]), 0.0);
        let a = analyze(&[], &[]);
        assert_eq!(a.mood, 0.0);
        assert_eq!(a.analyzed_count, 0);
        assert!(a.distribution.is_empty());
    }

    #[test]
    fn worked_example_saturates_to_one() {
        let b = breakdown(&[0.6, 0.6, 0.6, -0.2, -0.2]);
        assert!(approx(b.base_avg, 0.28));
        assert!(approx(b.scaled, 0.6272));
        assert_eq!(b.extreme_pos, 3);
        assert_eq!(b.extreme_neg, 0);
        assert!(approx(b.extreme_factor, 0.66));
        assert_eq!(b.mood, 1.0);
    }

    #[test]
    fn zero_average_uses_only_extreme_terms() {
        // mean 0 → scaled 0; one extreme each side cancels exactly.
        let b = breakdown(&[0.5, -0.5]);
        assert_eq!(b.scaled, 0.0);
        assert!(approx(b.extreme_factor, 0.0));
        assert!(approx(b.mood, 0.0));

        // mean 0 with four extremes of each sign in a batch of eight.
        let b = breakdown(&[0.9, 0.9, 0.9, 0.9, -0.9, -0.9, -0.9, -0.9]);
        assert!(approx(b.scaled, 0.0));
        assert!(approx(b.extreme_factor, 0.0));
    }

    #[test]
    fn linear_branch_near_zero() {
        let b = breakdown(&[0.05, 0.05]);
        assert!(approx(b.scaled, 0.175));
        assert!(approx(b.mood, 0.175));

        let b = breakdown(&[-0.04]);
        assert!(approx(b.scaled, -0.14));
    }

    #[test]
    fn quadratic_branch_keeps_sign() {
        let b = breakdown(&[-0.2, -0.2]);
        assert!(approx(b.scaled, -0.32));
        // no extremes, lean_neg=2 (< 3 imbalance)
        assert!(approx(b.mood, -0.32));
    }

    #[test]
    fn imbalance_term_follows_neg_minus_pos() {
        // three mildly negative headlines: quadratic -0.08 plus +0.2 imbalance
        let b = breakdown(&[-0.1001, -0.1001, -0.1001]);
        assert_eq!(b.lean_neg, 3);
        assert!(approx(b.extreme_factor, 0.2));
        assert!(b.mood > 0.0);

        let b = breakdown(&[0.2, 0.2, 0.2]);
        assert_eq!(b.lean_pos, 3);
        assert!(approx(b.extreme_factor, -0.2));
        assert!(approx(b.mood, 0.32 - 0.2));
    }

    #[test]
    fn extreme_share_bonus_only_above_quarter() {
        // exactly one quarter: no bonus
        let b = breakdown(&[-0.5, 0.0, 0.0, 0.0]);
        assert!(approx(b.extreme_factor, -0.15));
        // above a quarter: bonus
        let b = breakdown(&[-0.5, -0.5, 0.0, 0.0]);
        assert!(approx(b.extreme_factor, -0.3 - 0.3));
    }

    #[test]
    fn output_is_always_bounded() {
        assert_eq!(mood_score(&[1.0; 10]), 1.0);
        assert_eq!(mood_score(&[-1.0; 10]), -1.0);
        let m = mood_score(&[1.0, -1.0, 0.3, -0.7, 0.0]);
        assert!((-1.0..=1.0).contains(&m));
    }

    #[test]
    fn transform_is_deterministic() {
        let s = [0.3, -0.4, 0.77, -0.91, 0.02, 0.5];
        assert_eq!(mood_score(&s), mood_score(&s));
    }

    #[test]
    fn analyze_builds_distribution_and_category() {
        let items = vec![item("a"), item("b"), item("c"), item("d")];
        let a = analyze(&items, &[0.9, 0.3, 0.0, -0.95]);
        assert_eq!(a.analyzed_count, 4);
        assert_eq!(a.distribution.get(&Strength::VeryPositive), Some(&1));
        assert_eq!(a.distribution.get(&Strength::Positive), Some(&1));
        assert_eq!(a.distribution.get(&Strength::Neutral), Some(&1));
        assert_eq!(a.distribution.get(&Strength::VeryNegative), Some(&1));
        assert_eq!(a.distribution.values().sum::<usize>(), a.analyzed_count);
        assert_eq!(a.category, Category::from_mood(a.mood));
        assert_eq!(a.items[3].strength, Strength::VeryNegative);
    }

    #[test]
    fn analyze_ignores_items_without_scores() {
        let items = vec![item("a"), item("b")];
        let a = analyze(&items, &[0.4]);
        assert_eq!(a.analyzed_count, 1);
        assert_eq!(a.distribution.values().sum::<usize>(), 1);
    }
}
