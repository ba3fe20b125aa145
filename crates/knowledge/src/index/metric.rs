//! Similarity metrics and vector checks shared by every index.

use crate::error::{KnowledgeError, KnowledgeResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Metric used by one index instance for both exact and approximate search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// dot / (|a| * |b|), higher is better
    #[default]
    Cosine,
    /// sum of squared differences, lower is better
    SquaredEuclidean,
}

impl Metric {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Some(Self::Cosine),
            "squared_euclidean" | "l2" | "euclidean" => Some(Self::SquaredEuclidean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::SquaredEuclidean => "squared_euclidean",
        }
    }

    pub fn higher_is_better(&self) -> bool {
        matches!(self, Self::Cosine)
    }

    /// Score `b` against `a`. Callers validate vectors first.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let denom = norm(a) * norm(b);
                if denom == 0.0 {
                    // Only reachable for IVF centroids that averaged to zero.
                    f32::MIN
                } else {
                    dot(a, b) / denom
                }
            }
            Self::SquaredEuclidean => squared_distance(a, b),
        }
    }

    /// Order two scores best first.
    pub fn compare(&self, a: f32, b: f32) -> Ordering {
        if self.higher_is_better() {
            b.total_cmp(&a)
        } else {
            a.total_cmp(&b)
        }
    }

    /// Check a stored or query vector against the index shape.
    ///
    /// Length must equal `dimension`, every component must be finite and,
    /// under cosine, the norm must be non-zero.
    pub fn check(&self, vector: &[f32], dimension: usize) -> KnowledgeResult<()> {
        if vector.len() != dimension {
            return Err(KnowledgeError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }

        if vector.iter().any(|x| !x.is_finite()) {
            return Err(KnowledgeError::Validation(
                "Vector contains NaN or infinite components".to_string(),
            ));
        }

        if *self == Self::Cosine && norm(vector) == 0.0 {
            return Err(KnowledgeError::DegenerateVector(
                "cosine similarity is undefined for a zero-norm vector".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_score() {
        let metric = Metric::Cosine;
        assert!((metric.score(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(metric.score(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((metric.score(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_squared_euclidean_score() {
        let metric = Metric::SquaredEuclidean;
        assert_eq!(metric.score(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
    }

    #[test]
    fn test_compare_orders_best_first() {
        assert_eq!(Metric::Cosine.compare(0.9, 0.1), Ordering::Less);
        assert_eq!(Metric::SquaredEuclidean.compare(0.9, 0.1), Ordering::Greater);
    }

    #[test]
    fn test_check_rejects_wrong_dimension() {
        let err = Metric::Cosine.check(&[1.0, 2.0], 3).unwrap_err();
        assert!(matches!(
            err,
            KnowledgeError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_check_zero_vector() {
        assert!(matches!(
            Metric::Cosine.check(&[0.0, 0.0], 2),
            Err(KnowledgeError::DegenerateVector(_))
        ));
        // Zero vectors are fine under a distance metric.
        assert!(Metric::SquaredEuclidean.check(&[0.0, 0.0], 2).is_ok());
    }

    #[test]
    fn test_check_rejects_nan() {
        assert!(matches!(
            Metric::SquaredEuclidean.check(&[f32::NAN, 1.0], 2),
            Err(KnowledgeError::Validation(_))
        ));
    }

    #[test]
    fn test_parse() {
        assert_eq!(Metric::parse("L2"), Some(Metric::SquaredEuclidean));
        assert_eq!(Metric::parse("cosine"), Some(Metric::Cosine));
        assert_eq!(Metric::parse("manhattan"), None);
    }
}
