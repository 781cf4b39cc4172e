//! Similarity and confidence math for the pattern cache.

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for empty or zero-norm vectors rather than NaN, so a
/// degenerate embedding can never match anything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Confidence returned on a cache hit: the stored confidence plus a
/// usage boost of 0.01 per hit, capped at +0.15 and 0.99 overall.
pub fn adjusted_confidence(base: f64, usage_count: u32) -> f64 {
    let boost = (usage_count as f64 * 0.01).min(0.15);
    (base + boost).min(0.99)
}

/// Ranking weight for similar-example selection: proven patterns rank
/// above merely similar ones.
pub fn ranking_weight(similarity: f64, usage_count: u32) -> f64 {
    similarity * (1.0 + 0.1 * usage_count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![0.5, -0.2, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn opposite_vectors_have_similarity_minus_one() {
        let a = vec![1.0, 2.0];
        let b = vec![-1.0, -2.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_inputs_never_match() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn confidence_boost_caps_at_fifteen_points() {
        assert!((adjusted_confidence(0.8, 5) - 0.85).abs() < 1e-9);
        assert!((adjusted_confidence(0.8, 50) - 0.95).abs() < 1e-9);
    }

    #[test]
    fn confidence_never_exceeds_099() {
        assert!((adjusted_confidence(0.98, 100) - 0.99).abs() < 1e-9);
        assert!((adjusted_confidence(1.0, 0) - 0.99).abs() < 1e-9);
    }

    #[test]
    fn ranking_weight_prefers_heavily_used_patterns() {
        assert!(ranking_weight(0.8, 10) > ranking_weight(0.9, 0));
    }
}
