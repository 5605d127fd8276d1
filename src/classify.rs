//! classify.rs: discrete labels for per-item scores, aggregate mood and trend.
//!
//! Two threshold tables live here and are deliberately kept apart: the
//! per-item `Strength` bands are symmetric around zero (±0.2 / ±0.85), while
//! the aggregate `Category` bands are skewed negative (0.30 / 0.10 / -0.20 / -0.50).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fine-grained sentiment band of one scored headline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    VeryPositive,
    Positive,
    Neutral,
    Negative,
    VeryNegative,
}

impl Strength {
    /// `>0.85`, `>0.2`, `<-0.85`, `<-0.2`, else neutral. First matching band wins.
    pub fn from_score(score: f64) -> Self {
        if score > 0.85 {
            Strength::VeryPositive
        } else if score > 0.2 {
            Strength::Positive
        } else if score < -0.85 {
            Strength::VeryNegative
        } else if score < -0.2 {
            Strength::Negative
        } else {
            Strength::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strength::VeryPositive => "very_positive",
            Strength::Positive => "positive",
            Strength::Neutral => "neutral",
            Strength::Negative => "negative",
            Strength::VeryNegative => "very_negative",
        }
    }
}

/// Coarse band of the aggregate mood score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    VeryPositive,
    Positive,
    Neutral,
    Negative,
    VeryNegative,
}

impl Category {
    /// `>=0.30`, `>=0.10`, `>=-0.20`, `>=-0.50`, else very negative.
    pub fn from_mood(mood: f64) -> Self {
        if mood >= 0.30 {
            Category::VeryPositive
        } else if mood >= 0.10 {
            Category::Positive
        } else if mood >= -0.20 {
            Category::Neutral
        } else if mood >= -0.50 {
            Category::Negative
        } else {
            Category::VeryNegative
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::VeryPositive => "very_positive",
            Category::Positive => "positive",
            Category::Neutral => "neutral",
            Category::Negative => "negative",
            Category::VeryNegative => "very_negative",
        }
    }

    /// Inverse of [`Category::as_str`], used when reading stored rows.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "very_positive" => Some(Category::VeryPositive),
            "positive" => Some(Category::Positive),
            "neutral" => Some(Category::Neutral),
            "negative" => Some(Category::Negative),
            "very_negative" => Some(Category::VeryNegative),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the current mood against the rolling 24h average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Stable,
    Improving,
    Worsening,
}

impl Trend {
    /// `|change| < 0.05` is stable; otherwise the sign decides.
    pub fn from_change(change_24h: f64) -> Self {
        if change_24h.abs() < 0.05 {
            Trend::Stable
        } else if change_24h > 0.0 {
            Trend::Improving
        } else {
            Trend::Worsening
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_bands_are_strict() {
        assert_eq!(Strength::from_score(0.86), Strength::VeryPositive);
        assert_eq!(Strength::from_score(0.85), Strength::Positive);
        assert_eq!(Strength::from_score(0.21), Strength::Positive);
        assert_eq!(Strength::from_score(0.2), Strength::Neutral);
        assert_eq!(Strength::from_score(0.0), Strength::Neutral);
        assert_eq!(Strength::from_score(-0.2), Strength::Neutral);
        assert_eq!(Strength::from_score(-0.21), Strength::Negative);
        assert_eq!(Strength::from_score(-0.85), Strength::Negative);
        assert_eq!(Strength::from_score(-0.86), Strength::VeryNegative);
        assert_eq!(Strength::from_score(-1.0), Strength::VeryNegative);
    }

    #[test]
    fn category_bands_are_inclusive() {
        assert_eq!(Category::from_mood(1.0), Category::VeryPositive);
        assert_eq!(Category::from_mood(0.30), Category::VeryPositive);
        assert_eq!(Category::from_mood(0.29), Category::Positive);
        assert_eq!(Category::from_mood(0.10), Category::Positive);
        assert_eq!(Category::from_mood(0.09), Category::Neutral);
        assert_eq!(Category::from_mood(-0.20), Category::Neutral);
        assert_eq!(Category::from_mood(-0.21), Category::Negative);
        assert_eq!(Category::from_mood(-0.50), Category::Negative);
        assert_eq!(Category::from_mood(-0.51), Category::VeryNegative);
    }

    #[test]
    fn tables_disagree_on_purpose() {
        // 0.15 is a neutral headline but a positive mood.
        assert_eq!(Strength::from_score(0.15), Strength::Neutral);
        assert_eq!(Category::from_mood(0.15), Category::Positive);
        assert_eq!(Strength::from_score(-0.3), Strength::Negative);
        assert_eq!(Category::from_mood(-0.15), Category::Neutral);
    }

    #[test]
    fn category_string_roundtrip_and_serde_shape() {
        for c in [
            Category::VeryPositive,
            Category::Positive,
            Category::Neutral,
            Category::Negative,
            Category::VeryNegative,
        ] {
            assert_eq!(Category::parse(c.as_str()), Some(c));
            let v = serde_json::to_value(c).unwrap();
            assert_eq!(v, serde_json::json!(c.as_str()));
        }
        assert_eq!(Category::parse("sehr positiv"), None);
    }

    #[test]
    fn trend_threshold() {
        assert_eq!(Trend::from_change(0.049), Trend::Stable);
        assert_eq!(Trend::from_change(-0.049), Trend::Stable);
        assert_eq!(Trend::from_change(0.05), Trend::Improving);
        assert_eq!(Trend::from_change(-0.05), Trend::Worsening);
    }
}
