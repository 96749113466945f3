// tests/property/picker_test.rs

//! Property-based tests for the weighted picker: the empirical pick
//! distribution must converge to the configured weights.

use proptest::prelude::*;
use std::collections::HashMap;
use xds_resolver::core::selector::ClusterKey;
use xds_resolver::core::selector::picker::{PickEntry, WeightedPicker};

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 20, // Each case performs thousands of picks.
        ..ProptestConfig::default()
    })]

    #[test]
    fn empirical_distribution_follows_weights(
        weights in prop::collection::vec(1u64..=50, 1..=5)
    ) {
        let entries = weights
            .iter()
            .enumerate()
            .map(|(i, &w)| (w, PickEntry::new(ClusterKey::cluster(&format!("c{i}")))))
            .collect();
        let picker = WeightedPicker::new(entries).unwrap();
        let total: u64 = weights.iter().sum();

        const PICKS: usize = 20_000;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..PICKS {
            *counts
                .entry(picker.pick().key.as_str().to_string())
                .or_default() += 1;
        }

        for (i, &weight) in weights.iter().enumerate() {
            let expected = weight as f64 / total as f64;
            let actual = counts
                .get(&format!("cluster:c{i}"))
                .copied()
                .unwrap_or(0) as f64
                / PICKS as f64;
            // 0.05 absolute tolerance is far beyond the expected standard
            // deviation at this sample size.
            prop_assert!(
                (actual - expected).abs() < 0.05,
                "cluster c{i}: expected share {expected:.3}, got {actual:.3}"
            );
        }
    }

    #[test]
    fn zero_weight_entries_are_never_picked(
        live_weight in 1u64..=10,
        picks in 1usize..=500
    ) {
        let picker = WeightedPicker::new(vec![
            (0, PickEntry::new(ClusterKey::cluster("dead"))),
            (live_weight, PickEntry::new(ClusterKey::cluster("live"))),
            (0, PickEntry::new(ClusterKey::cluster("also-dead"))),
        ])
        .unwrap();
        for _ in 0..picks {
            prop_assert_eq!(picker.pick().key.as_str(), "cluster:live");
        }
    }
}

#[test]
fn zero_total_weight_is_rejected() {
    let err = WeightedPicker::new(vec![
        (0, PickEntry::new(ClusterKey::cluster("a"))),
        (0, PickEntry::new(ClusterKey::cluster("b"))),
    ])
    .unwrap_err();
    assert!(matches!(
        err,
        xds_resolver::core::errors::ResolverError::InvalidRoute(_)
    ));
}
