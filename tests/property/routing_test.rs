// tests/property/routing_test.rs

//! Property-based tests for virtual-host domain matching.

use proptest::prelude::*;
use xds_resolver::core::routing::find_best_matching_virtual_host;
use xds_resolver::core::xds::resources::VirtualHost;

fn vh(domains: Vec<String>) -> VirtualHost {
    VirtualHost {
        domains,
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn exact_domain_always_wins(
        host in "[a-z]{1,10}(\\.[a-z]{1,10}){0,2}",
        wildcard_first in any::<bool>()
    ) {
        let exact = vh(vec![host.clone()]);
        let wildcard = vh(vec!["*".to_string()]);
        let hosts = if wildcard_first {
            vec![wildcard, exact]
        } else {
            vec![exact, wildcard]
        };
        let best = find_best_matching_virtual_host(&host, &hosts).unwrap();
        prop_assert_eq!(&best.domains, &vec![host]);
    }

    #[test]
    fn wildcard_free_results_match_the_host_exactly(
        host in "[a-z]{1,12}",
        domains in prop::collection::vec("[a-z]{1,12}", 1..=8)
    ) {
        let hosts: Vec<VirtualHost> = domains.iter().map(|d| vh(vec![d.clone()])).collect();
        match find_best_matching_virtual_host(&host, &hosts) {
            Some(best) => prop_assert_eq!(&best.domains, &vec![host]),
            None => prop_assert!(!domains.contains(&host)),
        }
    }

    #[test]
    fn longer_suffix_patterns_beat_shorter_ones(
        label in "[a-z]{1,8}",
        middle in "[a-z]{1,8}"
    ) {
        let host = format!("{label}.{middle}.example.com");
        let short = vh(vec!["*.com".to_string()]);
        let long = vh(vec![format!("*.{middle}.example.com")]);
        let hosts = vec![short, long.clone()];
        let best = find_best_matching_virtual_host(&host, &hosts).unwrap();
        prop_assert_eq!(&best.domains, &long.domains);
    }
}
