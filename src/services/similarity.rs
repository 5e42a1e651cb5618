//! Exact vector comparison functions.
//!
//! Callers must check that both vectors have the same dimension first;
//! these functions only look at the common prefix.

use std::cmp::Ordering;

use crate::models::SimilarityMetric;

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(a: &[f32]) -> f32 {
    dot_product(a, a).sqrt()
}

/// Cosine similarity in [-1, 1]. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    (dot_product(a, b) / denom).clamp(-1.0, 1.0)
}

/// Euclidean (L2) distance.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Score `candidate` against `query` under `metric`.
pub fn score(metric: SimilarityMetric, query: &[f32], candidate: &[f32]) -> f32 {
    match metric {
        SimilarityMetric::Cosine => cosine_similarity(query, candidate),
        SimilarityMetric::L2 => l2_distance(query, candidate),
    }
}

/// Order two scores best-first for `metric`. NaN sorts last.
pub fn compare_scores(metric: SimilarityMetric, a: f32, b: f32) -> Ordering {
    let ord = if metric.higher_is_better() {
        b.partial_cmp(&a)
    } else {
        a.partial_cmp(&b)
    };
    ord.unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    #[test]
    fn test_cosine_identical_and_opposite() {
        let v = [0.3, -1.2, 2.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < EPS);
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &neg) + 1.0).abs() < EPS);
    }

    #[test]
    fn test_cosine_orthogonal_and_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < EPS);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_is_scale_invariant() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 4.0, 6.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_l2_distance() {
        assert!((l2_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < EPS);
        assert_eq!(l2_distance(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_compare_scores_direction() {
        assert_eq!(
            compare_scores(SimilarityMetric::Cosine, 0.9, 0.1),
            Ordering::Less
        );
        assert_eq!(
            compare_scores(SimilarityMetric::L2, 0.9, 0.1),
            Ordering::Greater
        );
        assert_eq!(
            compare_scores(SimilarityMetric::Cosine, 0.5, 0.5),
            Ordering::Equal
        );
        assert_eq!(
            compare_scores(SimilarityMetric::Cosine, f32::NAN, 0.5),
            Ordering::Greater
        );
    }
}
