// src/core/metrics.rs

//! Defines and registers Prometheus metrics for resolver monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire process lifecycle.

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, register_counter, register_counter_vec};

lazy_static! {
    // --- Resource update counters ---
    /// The total number of Listener resource updates processed by the resolver.
    pub static ref LISTENER_UPDATES_TOTAL: Counter =
        register_counter!("xds_resolver_listener_updates_total", "Total number of Listener updates processed.").unwrap();
    /// The total number of RouteConfiguration resource updates processed by the resolver.
    pub static ref ROUTE_CONFIG_UPDATES_TOTAL: Counter =
        register_counter!("xds_resolver_route_config_updates_total", "Total number of RouteConfiguration updates processed.").unwrap();

    // --- Selector counters ---
    /// The total number of config selectors built from resource updates.
    pub static ref SELECTOR_BUILDS_TOTAL: Counter =
        register_counter!("xds_resolver_selector_builds_total", "Total number of config selectors built.").unwrap();
    /// The total number of selector builds that failed (e.g., invalid route matchers).
    pub static ref SELECTOR_BUILD_FAILURES_TOTAL: Counter =
        register_counter!("xds_resolver_selector_build_failures_total", "Total number of failed config selector builds.").unwrap();

    // --- Emission counters ---
    /// The total number of service configurations emitted to the channel.
    pub static ref SERVICE_CONFIG_EMISSIONS_TOTAL: Counter =
        register_counter!("xds_resolver_service_config_emissions_total", "Total number of service config updates emitted to the channel.").unwrap();
    /// The total number of cluster entries pruned from the active-cluster table.
    pub static ref CLUSTERS_PRUNED_TOTAL: Counter =
        register_counter!("xds_resolver_clusters_pruned_total", "Total number of zero-reference clusters pruned from the active-cluster table.").unwrap();

    // --- Per-RPC counters ---
    /// The total number of pick attempts on config selectors, labeled by outcome.
    pub static ref PICKS_TOTAL: CounterVec =
        register_counter_vec!("xds_resolver_picks_total", "Total number of pick attempts, labeled by outcome.", &["outcome"]).unwrap();
}

/// Outcome label values for [`PICKS_TOTAL`].
pub mod pick_outcome {
    pub const OK: &str = "ok";
    pub const NO_ROUTE: &str = "no_route";
    pub const NON_FORWARDING: &str = "non_forwarding";
    pub const UNSUPPORTED: &str = "unsupported";
    pub const STOPPED: &str = "stopped";
}
