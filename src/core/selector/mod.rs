// src/core/selector/mod.rs

//! The per-generation config selector.
//!
//! A selector is an immutable snapshot of the current Listener and matched
//! virtual host. The channel invokes it once per outgoing RPC to pick a
//! cluster and collect per-call policy, and the returned [`CommitHandle`]
//! accounts for the RPC's lifetime against the active-cluster table.

use crate::core::channel::RpcInfo;
use crate::core::errors::ResolverError;
use crate::core::metrics::{self, pick_outcome};
use crate::core::routing::matcher::CompiledRouteMatcher;
use crate::core::xds::resources::{
    HashPolicy, HttpFilterSpec, ListenerUpdate, RetryPolicy, Route, RouteAction, VirtualHost,
};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

pub mod clusters;
pub mod picker;

pub use clusters::{ActiveClusters, ClusterInfo, ClusterKey};

use picker::{PickEntry, WeightedPicker};

/// Invoked whenever a cluster reference count transitions to zero. The
/// resolver installs a notifier that schedules a service-config regeneration
/// on its serializer; tests may install anything.
pub type ZeroRefNotifier = Arc<dyn Fn() + Send + Sync>;

/// The compiled action of a route.
enum CompiledAction {
    Forward(WeightedPicker),
    NonForwarding,
    Unsupported,
}

/// One route of a selector generation, fully resolved: the Listener fallback
/// for max-stream-duration and the virtual-host fallback for the retry policy
/// are applied at build time.
struct CompiledRoute {
    matcher: CompiledRouteMatcher,
    action: CompiledAction,
    max_stream_duration: Option<Duration>,
    http_filter_overrides: HashMap<String, serde_json::Value>,
    retry_policy: Option<RetryPolicy>,
    hash_policies: Vec<HashPolicy>,
}

/// An immutable per-generation config selector.
pub struct ConfigSelector {
    http_filters: Vec<HttpFilterSpec>,
    virtual_host_filter_overrides: HashMap<String, serde_json::Value>,
    routes: Vec<CompiledRoute>,
    /// Back-references into the active-cluster table for every cluster any
    /// route of this generation can reach. The table remains the owner; the
    /// selector contributes one reference count per entry while live.
    clusters: HashMap<ClusterKey, Arc<ClusterInfo>>,
    notifier: ZeroRefNotifier,
    stopped: AtomicBool,
}

impl ConfigSelector {
    /// Builds a selector generation from the current Listener and matched
    /// virtual host.
    ///
    /// All fallible work (matcher compilation, weight validation) happens
    /// before any reference is taken; on error the table may be left with new
    /// zero-reference entries, which the next pruning pass removes. On success
    /// every reachable cluster holds one additional "selector reference".
    pub fn build(
        listener: &ListenerUpdate,
        virtual_host: &VirtualHost,
        active: &mut ActiveClusters,
        notifier: ZeroRefNotifier,
    ) -> Result<Arc<Self>, ResolverError> {
        let mut clusters: HashMap<ClusterKey, Arc<ClusterInfo>> = HashMap::new();
        let mut routes = Vec::with_capacity(virtual_host.routes.len());

        for route in &virtual_host.routes {
            let matcher = CompiledRouteMatcher::compile(&route.matcher)?;
            let action = Self::compile_action(route, active, &mut clusters)?;
            routes.push(CompiledRoute {
                matcher,
                action,
                max_stream_duration: route.max_stream_duration.or(listener.max_stream_duration),
                http_filter_overrides: route.http_filter_overrides.clone(),
                retry_policy: route
                    .retry_policy
                    .clone()
                    .or_else(|| virtual_host.retry_policy.clone()),
                hash_policies: route.hash_policies.clone(),
            });
        }

        let selector = Arc::new(Self {
            http_filters: listener.http_filters.clone(),
            virtual_host_filter_overrides: virtual_host.http_filter_overrides.clone(),
            routes,
            clusters,
            notifier,
            stopped: AtomicBool::new(false),
        });

        // All fallible work is done; account for this generation's clusters.
        for info in selector.clusters.values() {
            info.acquire();
        }
        metrics::SELECTOR_BUILDS_TOTAL.inc();
        Ok(selector)
    }

    fn compile_action(
        route: &Route,
        active: &mut ActiveClusters,
        clusters: &mut HashMap<ClusterKey, Arc<ClusterInfo>>,
    ) -> Result<CompiledAction, ResolverError> {
        match &route.action {
            RouteAction::WeightedClusters(weighted) => {
                if weighted.is_empty() {
                    return Err(ResolverError::InvalidRoute(
                        "weighted-cluster route with no clusters".to_string(),
                    ));
                }
                let mut entries = Vec::with_capacity(weighted.len());
                for wc in weighted {
                    let key = ClusterKey::cluster(&wc.name);
                    let info = active.add_or_get(&key);
                    info.set_child_config(json!({ "cds": { "cluster": &wc.name } }));
                    clusters.insert(key.clone(), info);
                    entries.push((
                        u64::from(wc.weight),
                        PickEntry {
                            key,
                            http_filter_overrides: wc.http_filter_overrides.clone(),
                        },
                    ));
                }
                Ok(CompiledAction::Forward(WeightedPicker::new(entries)?))
            }
            RouteAction::ClusterSpecifierPlugin { name, config } => {
                let key = ClusterKey::specifier_plugin(name);
                let info = active.add_or_get(&key);
                info.set_child_config(config.clone());
                clusters.insert(key.clone(), info);
                Ok(CompiledAction::Forward(WeightedPicker::new(vec![(
                    1,
                    PickEntry::new(key),
                )])?))
            }
            RouteAction::NonForwarding => Ok(CompiledAction::NonForwarding),
            RouteAction::Unsupported => Ok(CompiledAction::Unsupported),
        }
    }

    /// Picks a cluster for an RPC.
    ///
    /// Routes are walked in declared order and the first matching route wins.
    /// On success the chosen cluster's reference count has already been
    /// incremented; the caller must eventually commit (or drop) the returned
    /// [`CommitHandle`] exactly once, at RPC completion.
    pub fn pick(&self, rpc: &RpcInfo) -> Result<PickResult, ResolverError> {
        if self.stopped.load(Ordering::Acquire) {
            metrics::PICKS_TOTAL
                .with_label_values(&[pick_outcome::STOPPED])
                .inc();
            return Err(ResolverError::SelectorStopped);
        }
        let Some(route) = self.routes.iter().find(|r| r.matcher.matches(rpc)) else {
            metrics::PICKS_TOTAL
                .with_label_values(&[pick_outcome::NO_ROUTE])
                .inc();
            return Err(ResolverError::NoMatchingRoute(rpc.method.clone()));
        };
        let picker = match &route.action {
            CompiledAction::Forward(picker) => picker,
            CompiledAction::NonForwarding => {
                metrics::PICKS_TOTAL
                    .with_label_values(&[pick_outcome::NON_FORWARDING])
                    .inc();
                return Err(ResolverError::NonForwardingAction);
            }
            CompiledAction::Unsupported => {
                metrics::PICKS_TOTAL
                    .with_label_values(&[pick_outcome::UNSUPPORTED])
                    .inc();
                return Err(ResolverError::UnsupportedRouteAction);
            }
        };

        let entry = picker.pick();
        let info = self.clusters.get(&entry.key).cloned().ok_or_else(|| {
            ResolverError::Internal(format!("picked cluster {} not held by selector", entry.key))
        })?;
        info.acquire();
        metrics::PICKS_TOTAL
            .with_label_values(&[pick_outcome::OK])
            .inc();

        Ok(PickResult {
            cluster: entry.key.clone(),
            http_filters: self.compose_filters(route, entry),
            max_stream_duration: route.max_stream_duration,
            retry_policy: route.retry_policy.clone(),
            hash_policies: route.hash_policies.clone(),
            on_committed: CommitHandle::new(info, self.notifier.clone()),
        })
    }

    /// Composes the effective HTTP filter chain for a pick: the Listener's
    /// filters in order, each with the most specific override winning
    /// (weighted-cluster, then route, then virtual host, then the filter's own
    /// config).
    fn compose_filters(&self, route: &CompiledRoute, entry: &PickEntry) -> Vec<EffectiveHttpFilter> {
        self.http_filters
            .iter()
            .map(|filter| {
                let config = entry
                    .http_filter_overrides
                    .get(&filter.name)
                    .or_else(|| route.http_filter_overrides.get(&filter.name))
                    .or_else(|| self.virtual_host_filter_overrides.get(&filter.name))
                    .cloned()
                    .unwrap_or_else(|| filter.config.clone());
                EffectiveHttpFilter {
                    name: filter.name.clone(),
                    config,
                }
            })
            .collect()
    }

    /// Stops the selector: releases the one selector reference held per
    /// reachable cluster and fails all future picks. Idempotent. Outstanding
    /// commit handles from already-admitted RPCs remain valid.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut any_zero = false;
        for info in self.clusters.values() {
            if info.release() == 0 {
                any_zero = true;
            }
        }
        if any_zero {
            debug!("selector stop dropped cluster references to zero");
            (self.notifier)();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// The cluster keys this generation can reach.
    pub fn cluster_keys(&self) -> Vec<ClusterKey> {
        self.clusters.keys().cloned().collect()
    }
}

impl Drop for ConfigSelector {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ConfigSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSelector")
            .field("routes", &self.routes.len())
            .field("clusters", &self.clusters.keys())
            .field("stopped", &self.stopped.load(Ordering::Acquire))
            .finish()
    }
}

/// The effective config of one HTTP filter after override composition.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveHttpFilter {
    pub name: String,
    pub config: serde_json::Value,
}

/// Everything the channel needs to dispatch an admitted RPC.
#[derive(Debug)]
pub struct PickResult {
    /// The chosen cluster key, e.g. `cluster:backend` or `csp:my-plugin`.
    pub cluster: ClusterKey,
    /// The composed HTTP filter chain for this RPC.
    pub http_filters: Vec<EffectiveHttpFilter>,
    pub max_stream_duration: Option<Duration>,
    pub retry_policy: Option<RetryPolicy>,
    pub hash_policies: Vec<HashPolicy>,
    /// Completion hook: commit (or drop) exactly once when the RPC finishes.
    pub on_committed: CommitHandle,
}

/// The completion hook of an admitted RPC. Releases the RPC's cluster
/// reference exactly once, either through [`CommitHandle::commit`] or on drop.
pub struct CommitHandle {
    cluster: Arc<ClusterInfo>,
    notifier: ZeroRefNotifier,
    committed: AtomicBool,
}

impl CommitHandle {
    fn new(cluster: Arc<ClusterInfo>, notifier: ZeroRefNotifier) -> Self {
        Self {
            cluster,
            notifier,
            committed: AtomicBool::new(false),
        }
    }

    /// Releases the cluster reference taken at pick time. Safe to call more
    /// than once; only the first call has an effect. On the transition to
    /// zero, schedules a service-config regeneration via the notifier.
    pub fn commit(&self) {
        if self.committed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.cluster.release() == 0 {
            (self.notifier)();
        }
    }
}

impl Drop for CommitHandle {
    fn drop(&mut self) {
        self.commit();
    }
}

impl fmt::Debug for CommitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitHandle")
            .field("cluster", self.cluster.key())
            .field("committed", &self.committed.load(Ordering::Acquire))
            .finish()
    }
}
