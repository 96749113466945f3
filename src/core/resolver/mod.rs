// src/core/resolver/mod.rs

//! The resolver core: target handling, construction, and the serialized state
//! machine that owns the LDS/RDS subscriptions, the active-cluster table, and
//! the current config selector.

use crate::core::channel::{ClientChannel, ResolverUpdate};
use crate::core::errors::ResolverError;
use crate::core::metrics;
use crate::core::routing;
use crate::core::selector::{ActiveClusters, ConfigSelector, ZeroRefNotifier};
use crate::core::service_config;
use crate::core::xds::resources::{ListenerUpdate, RouteConfigUpdate, RouteSource, VirtualHost};
use crate::core::xds::{ClientFactory, SharedClientFactory, WatchHandle, XdsClient};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

mod serializer;
mod watchers;

use serializer::{SerializerHandle, WorkSerializer};
use watchers::{ListenerWatcher, RouteConfigWatcher};

/// The URI scheme handled by this resolver.
pub const SCHEME: &str = "xds";

/// A parsed resolver target: `xds://[authority]/endpoint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// The bootstrap authority to resolve through, when present.
    pub authority: Option<String>,
    /// The logical service name substituted into the listener name template.
    pub endpoint: String,
}

impl Target {
    pub fn new(authority: Option<String>, endpoint: impl Into<String>) -> Self {
        Self {
            authority,
            endpoint: endpoint.into(),
        }
    }

    /// Parses an `xds://` URI into a target.
    pub fn parse(uri: &str) -> Result<Self, ResolverError> {
        let url = Url::parse(uri)
            .map_err(|e| ResolverError::InvalidTarget(uri.to_string(), e.to_string()))?;
        if url.scheme() != SCHEME {
            return Err(ResolverError::InvalidTarget(
                uri.to_string(),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        let authority = url.host_str().filter(|h| !h.is_empty()).map(str::to_string);
        let endpoint = url.path().trim_start_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(ResolverError::InvalidTarget(
                uri.to_string(),
                "empty endpoint".to_string(),
            ));
        }
        Ok(Self {
            authority,
            endpoint,
        })
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{SCHEME}://{}/{}",
            self.authority.as_deref().unwrap_or(""),
            self.endpoint
        )
    }
}

/// Options supplied by the channel at resolver construction.
#[derive(Clone, Default)]
pub struct ResolverOptions {
    /// Whether the channel was created with xDS-aware transport credentials.
    /// When set, the bootstrap must carry certificate provider configs.
    pub xds_credentials_in_use: bool,
    /// Overrides the process-wide shared xDS client factory. Tests use this to
    /// run resolvers against distinct bootstraps in parallel.
    pub client_factory: Option<Arc<dyn ClientFactory>>,
}

impl std::fmt::Debug for ResolverOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverOptions")
            .field("xds_credentials_in_use", &self.xds_credentials_in_use)
            .field("has_client_factory", &self.client_factory.is_some())
            .finish()
    }
}

/// The xDS name resolver. Construction subscribes to the Listener resource
/// derived from the target; every later state change is pushed through the
/// channel interface.
#[derive(Debug)]
pub struct XdsResolver {
    serializer: WorkSerializer,
}

impl XdsResolver {
    /// Builds a resolver and starts the Listener watch.
    ///
    /// Fails synchronously on configuration errors: an empty bootstrap,
    /// xDS-aware credentials without certificate providers, or a target
    /// authority absent from the bootstrap authorities map. On failure the
    /// xDS client reference is released and no watcher is created.
    ///
    /// Must be called from within a Tokio runtime; the serializer worker is
    /// spawned onto it.
    pub fn build(
        target: Target,
        channel: Arc<dyn ClientChannel>,
        options: ResolverOptions,
    ) -> Result<Self, ResolverError> {
        let factory = options
            .client_factory
            .clone()
            .unwrap_or_else(|| Arc::new(SharedClientFactory));
        let client = factory.new_client()?;

        let listener_resource_name = match Self::validate(&target, &options, &client) {
            Ok(name) => name,
            Err(err) => {
                client.close();
                return Err(err);
            }
        };

        info!(
            target = %target,
            resource = %listener_resource_name,
            "building xDS resolver"
        );

        let (handle, queue) = serializer::queue();
        let state = ResolverState::new(channel, client, listener_resource_name, handle.clone());
        let serializer = WorkSerializer::spawn(queue, state);
        handle.post(|state| state.start_listener_watch());

        Ok(Self { serializer })
    }

    fn validate(
        target: &Target,
        options: &ResolverOptions,
        client: &Arc<dyn XdsClient>,
    ) -> Result<String, ResolverError> {
        let bootstrap = client.bootstrap();
        if bootstrap.is_empty() {
            return Err(ResolverError::EmptyBootstrap);
        }
        if options.xds_credentials_in_use && bootstrap.certificate_providers.is_empty() {
            return Err(ResolverError::MissingCertProviders);
        }
        bootstrap.listener_resource_name(target)
    }

    /// A no-op: xDS is push-based, so there is nothing to re-resolve.
    pub fn resolve_now(&self) {}

    /// Closes the resolver: cancels the serializer, waits for it to drain,
    /// then stops the watchers and releases the xDS client. Idempotent and
    /// tolerant of partial construction.
    pub async fn close(&self) {
        self.serializer.cancel();
        self.serializer.join().await;
    }
}

impl Drop for XdsResolver {
    fn drop(&mut self) {
        // A resolver dropped without close() still tears down; the worker
        // observes the cancellation and runs shutdown on its own.
        self.serializer.cancel();
    }
}

/// All serializer-confined resolver state. Every method on this type runs on
/// the serializer worker; nothing here needs a lock.
pub(crate) struct ResolverState {
    channel: Arc<dyn ClientChannel>,
    /// Held from build to close; `None` after shutdown released it.
    xds_client: Option<Arc<dyn XdsClient>>,
    lds_resource_name: String,
    serializer: SerializerHandle,

    listener_watcher: Option<Arc<ListenerWatcher>>,
    lds_watch: Option<WatchHandle>,

    current_listener: Option<ListenerUpdate>,
    listener_received: bool,

    /// The RDS resource name currently subscribed to, when the Listener
    /// delegates routing via RDS.
    rds_resource_name: Option<String>,
    route_config_watcher: Option<(Arc<RouteConfigWatcher>, WatchHandle)>,
    current_route_config: Option<RouteConfigUpdate>,
    route_config_received: bool,
    current_virtual_host: Option<VirtualHost>,

    active_clusters: ActiveClusters,
    current_selector: Option<Arc<ConfigSelector>>,
}

impl ResolverState {
    fn new(
        channel: Arc<dyn ClientChannel>,
        client: Arc<dyn XdsClient>,
        lds_resource_name: String,
        serializer: SerializerHandle,
    ) -> Self {
        Self {
            channel,
            xds_client: Some(client),
            lds_resource_name,
            serializer,
            listener_watcher: None,
            lds_watch: None,
            current_listener: None,
            listener_received: false,
            rds_resource_name: None,
            route_config_watcher: None,
            current_route_config: None,
            route_config_received: false,
            current_virtual_host: None,
            active_clusters: ActiveClusters::new(),
            current_selector: None,
        }
    }

    /// The notifier handed to config selectors and commit handles: posts a
    /// ref-down-to-zero event back onto this serializer. Posting is safe from
    /// any thread, and safe to do opportunistically; the core prunes
    /// zero-reference entries on every emission.
    fn zero_ref_notifier(&self) -> ZeroRefNotifier {
        let serializer = self.serializer.clone();
        Arc::new(move || {
            serializer.post(|state| state.on_cluster_ref_down_to_zero());
        })
    }

    // --- Watch lifecycle ---

    pub(crate) fn start_listener_watch(&mut self) {
        let Some(client) = self.xds_client.clone() else {
            return;
        };
        let watcher = ListenerWatcher::new(self.serializer.clone());
        let watch = client.watch_listener(&self.lds_resource_name, watcher.clone());
        self.listener_watcher = Some(watcher);
        self.lds_watch = Some(watch);
        debug!(resource = %self.lds_resource_name, "started listener watch");
    }

    fn start_route_config_watch(&mut self, name: String) {
        let Some(client) = self.xds_client.clone() else {
            return;
        };
        let watcher = RouteConfigWatcher::new(name.clone(), self.serializer.clone());
        let watch = client.watch_route_config(&name, watcher.clone());
        self.route_config_watcher = Some((watcher, watch));
        debug!(resource = %name, "started route config watch");
    }

    /// Stops the current RDS watch, if any, and clears the subscribed name.
    fn cancel_route_config_watch(&mut self) {
        self.rds_resource_name = None;
        if let Some((watcher, watch)) = self.route_config_watcher.take() {
            watcher.stop();
            watch.cancel();
        }
    }

    // --- Serialized events ---

    pub(crate) fn on_listener_update(&mut self, update: ListenerUpdate) {
        metrics::LISTENER_UPDATES_TOTAL.inc();
        debug!(resource = %self.lds_resource_name, "received listener update");
        self.listener_received = true;

        match update.route_source.clone() {
            RouteSource::Inline(route_config) => {
                // An inline route config and an RDS subscription are exclusive.
                self.cancel_route_config_watch();
                self.current_listener = Some(update);
                self.apply_route_config_update(route_config);
            }
            RouteSource::Rds(name) => {
                self.current_listener = Some(update);
                if self.rds_resource_name.as_deref() == Some(name.as_str()) {
                    // Same subscription; the filters or the default stream
                    // duration may still have changed. Re-derive from the
                    // retained route configuration rather than waiting for a
                    // fresh RDS delivery.
                    if self.route_config_received {
                        if let Some(route_config) = self.current_route_config.clone() {
                            self.apply_route_config_update(route_config);
                        }
                    }
                } else {
                    self.cancel_route_config_watch();
                    // The previous selector keeps serving until the new RDS
                    // resource arrives; only the received flag and the matched
                    // virtual host are invalidated here.
                    self.current_virtual_host = None;
                    self.route_config_received = false;
                    self.rds_resource_name = Some(name.clone());
                    self.start_route_config_watch(name);
                }
            }
        }
    }

    pub(crate) fn on_route_config_update(&mut self, name: String, update: RouteConfigUpdate) {
        if self.rds_resource_name.as_deref() != Some(name.as_str()) {
            debug!(resource = %name, "dropping stale route config update");
            return;
        }
        metrics::ROUTE_CONFIG_UPDATES_TOTAL.inc();
        debug!(resource = %name, "received route config update");
        self.apply_route_config_update(update);
    }

    /// Applies a route configuration, whether it arrived via RDS or inlined in
    /// the Listener: matches a virtual host and re-runs resolution.
    fn apply_route_config_update(&mut self, update: RouteConfigUpdate) {
        let Some(virtual_host) =
            routing::find_best_matching_virtual_host(&self.lds_resource_name, &update.virtual_hosts)
                .cloned()
        else {
            warn!(
                resource = %self.lds_resource_name,
                "no matching virtual host in route configuration"
            );
            self.channel.report_error(ResolverError::NoMatchingVirtualHost(
                self.lds_resource_name.clone(),
            ));
            return;
        };
        self.current_virtual_host = Some(virtual_host);
        self.current_route_config = Some(update);
        self.route_config_received = true;
        self.on_resolution_complete();
    }

    pub(crate) fn on_listener_error(&mut self, err: ResolverError) {
        warn!(resource = %self.lds_resource_name, %err, "listener watch error");
        self.channel.report_error(err);
    }

    pub(crate) fn on_route_config_error(&mut self, name: String, err: ResolverError) {
        if self.rds_resource_name.as_deref() != Some(name.as_str()) {
            debug!(resource = %name, "dropping stale route config error");
            return;
        }
        warn!(resource = %name, %err, "route config watch error");
        self.channel.report_error(err);
    }

    pub(crate) fn on_listener_resource_not_found(&mut self) {
        warn!(resource = %self.lds_resource_name, "listener resource does not exist");
        self.listener_received = false;
        self.cancel_route_config_watch();
        self.current_virtual_host = None;
        self.route_config_received = false;
        self.on_resource_not_found();
    }

    pub(crate) fn on_route_config_resource_not_found(&mut self, name: String) {
        if self.rds_resource_name.as_deref() != Some(name.as_str()) {
            debug!(resource = %name, "dropping stale route config not-found");
            return;
        }
        warn!(resource = %name, "route config resource does not exist");
        self.route_config_received = false;
        self.on_resource_not_found();
    }

    /// The watched configuration disappeared, but in-flight RPCs still depend
    /// on the active clusters. Emit the current table with the nil selector so
    /// new RPCs fail, then release the selector's references; as in-flight
    /// RPCs complete, later emissions shrink toward the empty document.
    fn on_resource_not_found(&mut self) {
        self.send_new_service_config(None);
        if let Some(previous) = self.current_selector.take() {
            previous.stop();
        }
    }

    pub(crate) fn on_cluster_ref_down_to_zero(&mut self) {
        debug!("cluster reference count dropped to zero, regenerating service config");
        self.send_new_service_config(self.current_selector.clone());
    }

    /// Re-runs resolution after any state change that may alter the emitted
    /// configuration. No-op until both resources have been received and a
    /// virtual host has matched.
    fn on_resolution_complete(&mut self) {
        if !(self.listener_received && self.route_config_received) {
            return;
        }
        let notifier = self.zero_ref_notifier();
        let (Some(listener), Some(virtual_host)) =
            (self.current_listener.as_ref(), self.current_virtual_host.as_ref())
        else {
            return;
        };

        let selector = match ConfigSelector::build(
            listener,
            virtual_host,
            &mut self.active_clusters,
            notifier,
        ) {
            Ok(selector) => selector,
            Err(err) => {
                metrics::SELECTOR_BUILD_FAILURES_TOTAL.inc();
                error!(%err, "failed to build config selector, keeping previous");
                self.channel.report_error(err);
                return;
            }
        };

        if !self.send_new_service_config(Some(selector.clone())) {
            // Emission failed; drop the new generation's references and keep
            // serving with the previous selector.
            selector.stop();
            return;
        }

        if let Some(previous) = self.current_selector.replace(selector) {
            previous.stop();
        }
    }

    /// Prunes the table, formats the service configuration, and pushes it to
    /// the channel together with `selector`. Returns whether the channel
    /// accepted the update.
    fn send_new_service_config(&mut self, selector: Option<Arc<ConfigSelector>>) -> bool {
        let pruned = self.active_clusters.prune_unreferenced();
        if pruned > 0 {
            metrics::CLUSTERS_PRUNED_TOTAL.inc_by(pruned as f64);
            debug!(pruned, "pruned zero-reference clusters");
        }

        if selector.is_none() && self.active_clusters.is_empty() {
            // No clusters and a failing selector: the empty config selects
            // pick-first with no addresses, driving the channel into
            // transient failure.
            return self.push_update("{}", None);
        }

        let document = service_config::service_config_json(&self.active_clusters).to_string();
        self.push_update(&document, selector)
    }

    fn push_update(&mut self, document: &str, selector: Option<Arc<ConfigSelector>>) -> bool {
        let parsed = match self.channel.parse_service_config(document) {
            Ok(parsed) => parsed,
            Err(err) => {
                error!(%err, "channel failed to parse generated service config");
                self.channel
                    .report_error(ResolverError::ServiceConfig(err));
                return false;
            }
        };
        metrics::SERVICE_CONFIG_EMISSIONS_TOTAL.inc();
        match self.channel.update_state(ResolverUpdate {
            service_config: parsed,
            config_selector: selector,
        }) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "channel rejected resolver state update");
                false
            }
        }
    }

    /// Runs on the serializer worker after cancellation: stops watchers, drops
    /// the current selector's references, and releases the xDS client.
    pub(crate) fn shutdown(&mut self) {
        if let Some(watcher) = self.listener_watcher.take() {
            watcher.stop();
        }
        if let Some(watch) = self.lds_watch.take() {
            watch.cancel();
        }
        self.cancel_route_config_watch();
        if let Some(selector) = self.current_selector.take() {
            selector.stop();
        }
        if let Some(client) = self.xds_client.take() {
            client.close();
        }
        debug!(resource = %self.lds_resource_name, "resolver shut down");
    }
}
