// Cosine similarity over feature vectors.
//
// Vectors here are short (12 elements) so a single scalar pass is enough;
// there is no SIMD path.

/// Magnitudes below this are treated as zero vectors.
pub const MIN_MAGNITUDE: f64 = 1e-9;

/// Computes cosine similarity: $(a\cdot b)/(\|a\|\|b\|)$.
///
/// Returns 0.0 when the lengths differ, either slice is empty, either
/// magnitude is below [`MIN_MAGNITUDE`], or the result is not finite.
#[inline]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();
    if !(norm_a >= MIN_MAGNITUDE && norm_b >= MIN_MAGNITUDE) {
        return 0.0;
    }

    let result = dot / (norm_a * norm_b);
    if !result.is_finite() {
        return 0.0;
    }
    result.clamp(-1.0, 1.0)
}

/// Score `candidates` against `query`, keep those with similarity >= `threshold`,
/// and return at most `limit` of them ordered by similarity (highest first).
///
/// Ties keep their original relative order.
pub fn top_k_similar<'a, T, F>(
    query: &[f64],
    candidates: impl IntoIterator<Item = &'a T>,
    vector_of: F,
    threshold: f64,
    limit: usize,
) -> Vec<(&'a T, f64)>
where
    T: 'a,
    F: Fn(&T) -> &[f64],
{
    let mut scored: Vec<(&'a T, f64)> = candidates
        .into_iter()
        .map(|c| (c, cosine_similarity(query, vector_of(c))))
        .filter(|(_, sim)| *sim >= threshold)
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let v = [0.1, 0.2, 0.3];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_orthogonal_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_degenerate_inputs_return_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1e-12, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_scale_invariance() {
        let a = [1.0, 2.0, 3.0];
        let b = [10.0, 20.0, 30.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_top_k_filters_sorts_and_truncates() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            vec![0.0, 1.0], // 0.0
            vec![1.0, 1.0], // ~0.707
            vec![1.0, 0.1], // ~0.995
            vec![2.0, 0.0], // 1.0
        ];
        let hits = top_k_similar(&query, &candidates, |v| v.as_slice(), 0.6, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, &vec![2.0, 0.0]);
        assert_eq!(hits[1].0, &vec![1.0, 0.1]);
        assert!(hits[0].1 >= hits[1].1);
    }
}
