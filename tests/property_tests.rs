//! Property tests over the pure domain math.

use proptest::prelude::*;

use synapse::domain::foundation::Rating;
use synapse::domain::patterns::{adjusted_confidence, cosine_similarity, ranking_weight};
use synapse::domain::versioning::unified_diff;

/// Two vectors of the same (arbitrary) length.
fn vector_pair() -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
    (1usize..32).prop_flat_map(|n| {
        (
            prop::collection::vec(-10.0f32..10.0, n),
            prop::collection::vec(-10.0f32..10.0, n),
        )
    })
}

proptest! {
    #[test]
    fn cosine_similarity_is_symmetric((a, b) in vector_pair()) {
        let ab = cosine_similarity(&a, &b);
        let ba = cosine_similarity(&b, &a);
        prop_assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_stays_in_range((v, w) in vector_pair()) {
        let similarity = cosine_similarity(&v, &w);
        prop_assert!((-1.0 - 1e-6..=1.0 + 1e-6).contains(&similarity));
    }

    #[test]
    fn adjusted_confidence_is_bounded_and_monotonic(
        base in 0.0f64..1.0,
        usage in 0u32..1000,
    ) {
        let adjusted = adjusted_confidence(base, usage);
        prop_assert!(adjusted <= 0.99);
        prop_assert!(adjusted + 1e-12 >= base.min(0.99));
        prop_assert!(adjusted <= base + 0.15 + 1e-12);
        // More usage never lowers the confidence.
        prop_assert!(adjusted_confidence(base, usage + 1) + 1e-12 >= adjusted);
    }

    #[test]
    fn ranking_weight_grows_with_usage(
        similarity in 0.01f64..1.0,
        usage in 0u32..100,
    ) {
        prop_assert!(ranking_weight(similarity, usage + 1) > ranking_weight(similarity, usage));
    }

    #[test]
    fn diff_line_counts_match_the_diff_body(
        from in prop::collection::vec("[a-c]{0,4}", 0..12),
        to in prop::collection::vec("[a-c]{0,4}", 0..12),
    ) {
        let from_text = from.join("\n");
        let to_text = to.join("\n");
        let (diff, added, removed) = unified_diff(&from_text, &to_text);

        let plus = diff.lines().filter(|l| l.starts_with('+') && !l.starts_with("+++")).count();
        let minus = diff.lines().filter(|l| l.starts_with('-') && !l.starts_with("---")).count();
        prop_assert_eq!(added as usize, plus);
        prop_assert_eq!(removed as usize, minus);
    }

    #[test]
    fn diff_of_identical_text_is_empty(lines in prop::collection::vec("[a-z]{0,6}", 0..16)) {
        let text = lines.join("\n");
        let (_, added, removed) = unified_diff(&text, &text);
        prop_assert_eq!(added, 0);
        prop_assert_eq!(removed, 0);
    }

    #[test]
    fn rating_accepts_exactly_one_through_five(value in 0u8..=20) {
        let result = Rating::new(value);
        prop_assert_eq!(result.is_ok(), (1..=5).contains(&value));
    }
}
