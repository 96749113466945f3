// tests/property/refcount_test.rs

//! Property-based tests for cluster reference counting: every increment is
//! matched by exactly one decrement once the selector is stopped and all
//! admitted RPCs have completed, regardless of the interleaving.

use crate::common::{route_config, weighted_route};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use xds_resolver::RpcInfo;
use xds_resolver::core::selector::{ActiveClusters, ClusterKey, ConfigSelector, ZeroRefNotifier};
use xds_resolver::core::xds::resources::{ListenerUpdate, RouteSource};

fn counting_notifier() -> (ZeroRefNotifier, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let captured = count.clone();
    (
        Arc::new(move || {
            captured.fetch_add(1, Ordering::AcqRel);
        }),
        count,
    )
}

fn listener() -> ListenerUpdate {
    ListenerUpdate {
        http_filters: Vec::new(),
        max_stream_duration: None,
        route_source: RouteSource::Rds("rc".to_string()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn references_are_conserved(
        hold_flags in prop::collection::vec(any::<bool>(), 0..=60),
        stop_before_commit in any::<bool>()
    ) {
        let mut active = ActiveClusters::new();
        let (notifier, zero_events) = counting_notifier();
        let config = route_config("svc", vec![weighted_route(&[("a", 1), ("b", 2), ("c", 3)])]);
        let selector = ConfigSelector::build(
            &listener(),
            &config.virtual_hosts[0],
            &mut active,
            notifier,
        )
        .unwrap();
        let keys = [
            ClusterKey::cluster("a"),
            ClusterKey::cluster("b"),
            ClusterKey::cluster("c"),
        ];

        let mut held = Vec::new();
        for hold in hold_flags {
            let pick = selector.pick(&RpcInfo::new("/M")).unwrap();
            // While the selector is live, every reachable cluster keeps at
            // least its selector reference.
            for key in &keys {
                prop_assert!(active.get(key).unwrap().ref_count() >= 1);
            }
            if hold {
                held.push(pick);
            }
        }

        if stop_before_commit {
            selector.stop();
        }
        // Completing the in-flight RPCs (drop commits implicitly).
        held.clear();
        selector.stop();

        for key in &keys {
            prop_assert_eq!(active.get(key).unwrap().ref_count(), 0);
        }
        // At least one transition-to-zero notification fired so the core
        // would have pruned.
        prop_assert!(zero_events.load(Ordering::Acquire) >= 1);
        prop_assert_eq!(active.prune_unreferenced(), 3);
        prop_assert!(active.is_empty());
    }
}
