// tests/common/mod.rs

//! Shared fakes and helpers for resolver tests: an in-memory xDS client whose
//! deliveries are driven by the test, and a channel that records everything
//! the resolver pushes at it.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use xds_resolver::config::BootstrapConfig;
use xds_resolver::core::errors::ResolverError;
use xds_resolver::core::xds::resources::{ListenerUpdate, RouteConfigUpdate};
use xds_resolver::core::xds::{
    ClientFactory, ListenerWatcherCallbacks, RouteConfigWatcherCallbacks, WatchHandle, XdsClient,
};
use xds_resolver::{
    ClientChannel, ConfigSelector, ParsedServiceConfig, ResolverOptions, ResolverUpdate, Target,
    XdsResolver,
};

/// Initializes tracing once for the test binary.
pub fn init_tracing() {
    use tracing_subscriber::prelude::*;
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

struct RegisteredWatch<W> {
    name: String,
    watcher: W,
    active: Arc<AtomicBool>,
}

/// A fake xDS client. Watches are recorded; the test delivers updates by hand.
/// Cancelled watches stay registered (marked inactive) so tests can simulate
/// in-flight deliveries racing cancellation.
pub struct FakeXdsClient {
    bootstrap: Arc<BootstrapConfig>,
    listener_watches: Mutex<Vec<RegisteredWatch<Arc<dyn ListenerWatcherCallbacks>>>>,
    route_watches: Mutex<Vec<RegisteredWatch<Arc<dyn RouteConfigWatcherCallbacks>>>>,
    close_calls: AtomicUsize,
}

impl FakeXdsClient {
    pub fn new(bootstrap: BootstrapConfig) -> Arc<Self> {
        Arc::new(Self {
            bootstrap: Arc::new(bootstrap),
            listener_watches: Mutex::new(Vec::new()),
            route_watches: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
        })
    }

    pub fn active_listener_watches(&self) -> usize {
        self.listener_watches
            .lock()
            .iter()
            .filter(|w| w.active.load(Ordering::Acquire))
            .count()
    }

    /// Names of currently active route-config watches.
    pub fn active_route_watches(&self) -> Vec<String> {
        self.route_watches
            .lock()
            .iter()
            .filter(|w| w.active.load(Ordering::Acquire))
            .map(|w| w.name.clone())
            .collect()
    }

    /// Total number of route-config watches ever registered.
    pub fn total_route_watches(&self) -> usize {
        self.route_watches.lock().len()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Acquire)
    }

    /// Delivers a Listener update to every active listener watcher.
    pub fn push_listener_update(&self, update: ListenerUpdate) {
        for watch in self.listener_watches.lock().iter() {
            if watch.active.load(Ordering::Acquire) {
                watch.watcher.on_update(update.clone());
            }
        }
    }

    pub fn push_listener_error(&self, err: ResolverError) {
        for watch in self.listener_watches.lock().iter() {
            if watch.active.load(Ordering::Acquire) {
                watch.watcher.on_error(err.clone());
            }
        }
    }

    pub fn push_listener_not_found(&self) {
        for watch in self.listener_watches.lock().iter() {
            if watch.active.load(Ordering::Acquire) {
                watch.watcher.on_resource_does_not_exist();
            }
        }
    }

    /// Delivers a route-config update to every watch registered for `name`,
    /// including cancelled ones: a cancelled watch receiving a late delivery
    /// is exactly the in-flight race the resolver must tolerate.
    pub fn push_route_config_update(&self, name: &str, update: RouteConfigUpdate) {
        for watch in self.route_watches.lock().iter() {
            if watch.name == name {
                watch.watcher.on_update(update.clone());
            }
        }
    }

    pub fn push_route_config_error(&self, name: &str, err: ResolverError) {
        for watch in self.route_watches.lock().iter() {
            if watch.name == name {
                watch.watcher.on_error(err.clone());
            }
        }
    }

    pub fn push_route_config_not_found(&self, name: &str) {
        for watch in self.route_watches.lock().iter() {
            if watch.name == name {
                watch.watcher.on_resource_does_not_exist();
            }
        }
    }
}

impl XdsClient for FakeXdsClient {
    fn watch_listener(
        &self,
        resource_name: &str,
        watcher: Arc<dyn ListenerWatcherCallbacks>,
    ) -> WatchHandle {
        let active = Arc::new(AtomicBool::new(true));
        self.listener_watches.lock().push(RegisteredWatch {
            name: resource_name.to_string(),
            watcher,
            active: active.clone(),
        });
        WatchHandle::new(move || active.store(false, Ordering::Release))
    }

    fn watch_route_config(
        &self,
        resource_name: &str,
        watcher: Arc<dyn RouteConfigWatcherCallbacks>,
    ) -> WatchHandle {
        let active = Arc::new(AtomicBool::new(true));
        self.route_watches.lock().push(RegisteredWatch {
            name: resource_name.to_string(),
            watcher,
            active: active.clone(),
        });
        WatchHandle::new(move || active.store(false, Ordering::Release))
    }

    fn bootstrap(&self) -> Arc<BootstrapConfig> {
        self.bootstrap.clone()
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::AcqRel);
    }
}

/// A [`ClientFactory`] that always hands out the same fake client.
pub struct FixedClientFactory {
    client: Arc<FakeXdsClient>,
}

impl FixedClientFactory {
    pub fn new(client: Arc<FakeXdsClient>) -> Arc<Self> {
        Arc::new(Self { client })
    }
}

impl ClientFactory for FixedClientFactory {
    fn new_client(&self) -> Result<Arc<dyn XdsClient>, ResolverError> {
        Ok(self.client.clone())
    }
}

/// One state update recorded by the fake channel.
#[derive(Clone)]
pub struct RecordedUpdate {
    pub config: serde_json::Value,
    pub selector: Option<Arc<ConfigSelector>>,
}

/// A fake channel recording every update and error pushed by the resolver.
#[derive(Default)]
pub struct FakeChannel {
    updates: Mutex<Vec<RecordedUpdate>>,
    errors: Mutex<Vec<ResolverError>>,
    reject_updates: AtomicBool,
    fail_parse: AtomicBool,
}

impl FakeChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn errors(&self) -> Vec<ResolverError> {
        self.errors.lock().clone()
    }

    pub fn nth_update(&self, index: usize) -> RecordedUpdate {
        self.updates.lock()[index].clone()
    }

    pub fn last_update(&self) -> RecordedUpdate {
        self.updates
            .lock()
            .last()
            .expect("no updates recorded")
            .clone()
    }

    pub fn set_reject_updates(&self, reject: bool) {
        self.reject_updates.store(reject, Ordering::Release);
    }

    pub fn set_fail_parse(&self, fail: bool) {
        self.fail_parse.store(fail, Ordering::Release);
    }

    /// Waits until at least `count` updates were recorded.
    pub async fn wait_for_updates(&self, count: usize) {
        wait_until(|| self.update_count() >= count, "updates").await;
    }

    /// Waits until at least `count` errors were recorded.
    pub async fn wait_for_errors(&self, count: usize) {
        wait_until(|| self.error_count() >= count, "errors").await;
    }
}

impl ClientChannel for FakeChannel {
    fn update_state(&self, update: ResolverUpdate) -> Result<(), ResolverError> {
        if self.reject_updates.load(Ordering::Acquire) {
            return Err(ResolverError::ChannelRejected);
        }
        self.updates.lock().push(RecordedUpdate {
            config: update.service_config.raw,
            selector: update.config_selector,
        });
        Ok(())
    }

    fn report_error(&self, err: ResolverError) {
        self.errors.lock().push(err);
    }

    fn parse_service_config(&self, json: &str) -> Result<ParsedServiceConfig, String> {
        if self.fail_parse.load(Ordering::Acquire) {
            return Err("injected parse failure".to_string());
        }
        serde_json::from_str(json)
            .map(|raw| ParsedServiceConfig { raw })
            .map_err(|e| e.to_string())
    }
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn wait_until(condition: impl Fn() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Builds a resolver against fresh fakes and returns all three pieces.
pub fn build_resolver(
    bootstrap: BootstrapConfig,
    target_uri: &str,
) -> (XdsResolver, Arc<FakeXdsClient>, Arc<FakeChannel>) {
    init_tracing();
    let client = FakeXdsClient::new(bootstrap);
    let channel = FakeChannel::new();
    let resolver = XdsResolver::build(
        Target::parse(target_uri).expect("invalid test target"),
        channel.clone(),
        ResolverOptions {
            client_factory: Some(FixedClientFactory::new(client.clone())),
            ..Default::default()
        },
    )
    .expect("resolver build failed");
    (resolver, client, channel)
}

/// Extracts the sorted cluster-manager child keys from a recorded update.
pub fn children_keys(update: &RecordedUpdate) -> Vec<String> {
    let Some(children) = update
        .config
        .pointer("/loadBalancingConfig/0/xds_cluster_manager/children")
        .and_then(|v| v.as_object())
    else {
        return Vec::new();
    };
    let mut keys: Vec<String> = children.keys().cloned().collect();
    keys.sort();
    keys
}

// --- Resource builders ---

use xds_resolver::core::xds::resources::{
    Route, RouteAction, RouteMatchSpec, RouteSource, VirtualHost, WeightedClusterSpec,
};

/// A Listener delegating its routing table to RDS.
pub fn rds_listener(route_config_name: &str) -> ListenerUpdate {
    ListenerUpdate {
        http_filters: Vec::new(),
        max_stream_duration: None,
        route_source: RouteSource::Rds(route_config_name.to_string()),
    }
}

/// A Listener carrying an inline route configuration.
pub fn inline_listener(route_config: RouteConfigUpdate) -> ListenerUpdate {
    ListenerUpdate {
        http_filters: Vec::new(),
        max_stream_duration: None,
        route_source: RouteSource::Inline(route_config),
    }
}

/// A catch-all route forwarding to the given weighted clusters.
pub fn weighted_route(clusters: &[(&str, u32)]) -> Route {
    Route {
        matcher: RouteMatchSpec::any(),
        action: RouteAction::WeightedClusters(
            clusters
                .iter()
                .map(|(name, weight)| WeightedClusterSpec::new(*name, *weight))
                .collect(),
        ),
        max_stream_duration: None,
        http_filter_overrides: Default::default(),
        retry_policy: None,
        hash_policies: Vec::new(),
    }
}

/// A route configuration with one virtual host serving `domain`.
pub fn route_config(domain: &str, routes: Vec<Route>) -> RouteConfigUpdate {
    RouteConfigUpdate {
        virtual_hosts: vec![VirtualHost {
            domains: vec![domain.to_string()],
            routes,
            http_filter_overrides: Default::default(),
            retry_policy: None,
        }],
    }
}

/// A route configuration with one virtual host and a single catch-all route to
/// `cluster` with weight 1.
pub fn single_cluster_route_config(domain: &str, cluster: &str) -> RouteConfigUpdate {
    route_config(domain, vec![weighted_route(&[(cluster, 1)])])
}
