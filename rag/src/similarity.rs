//! Vector similarity kernel.
//!
//! Pure numeric helpers used by the vector store. Callers validate dimensions; mismatched
//! lengths are compared over the shorter prefix.

use rayon::prelude::*;
use std::cmp::Ordering;

/// Computes the dot product of two vectors.
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(lhs, rhs)| lhs * rhs).sum()
}

/// Computes the Euclidean norm of a vector.
#[must_use]
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Computes cosine similarity between two vectors.
///
/// Returns `0.0` when either vector has zero magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (lhs, rhs) in a.iter().zip(b) {
        dot += lhs * rhs;
        norm_a += lhs * lhs;
        norm_b += rhs * rhs;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Scores `query` against every candidate in parallel, preserving candidate order.
#[must_use]
pub fn batch_cosine_similarity<V>(query: &[f32], candidates: &[V]) -> Vec<f32>
where
    V: AsRef<[f32]> + Sync,
{
    candidates
        .par_iter()
        .map(|candidate| cosine_similarity(query, candidate.as_ref()))
        .collect()
}

/// Returns the positions of the `k` highest scores, best first.
///
/// Equal scores keep their original relative order. `NaN` scores sort last.
#[must_use]
pub fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| compare_scores(scores[a], scores[b]));
    order.truncate(k);
    order
}

/// Descending comparison for scores with `NaN` ordered after every number.
pub(crate) fn compare_scores(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Scales a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = magnitude(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_handles_zero_norms() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_similarity_range() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < f32::EPSILON);
        assert!((cosine_similarity(&[2.0, 2.0], &[1.0, 1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dot_and_magnitude() {
        assert!((dot_product(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]) - 32.0).abs() < f32::EPSILON);
        assert!((magnitude(&[3.0, 4.0]) - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn batch_preserves_order() {
        let candidates = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]];
        let scores = batch_cosine_similarity(&[1.0, 0.0], &candidates);
        assert_eq!(scores.len(), 3);
        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert!(scores[1].abs() < 1e-6);
        assert!((scores[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn top_k_orders_and_truncates() {
        let scores = [0.2, 0.9, f32::NAN, 0.5, 0.9];
        assert_eq!(top_k(&scores, 3), vec![1, 4, 3]);
        assert_eq!(top_k(&scores, 10).last(), Some(&2));
        assert!(top_k(&scores, 0).is_empty());
    }

    #[test]
    fn normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((magnitude(&v) - 1.0).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
