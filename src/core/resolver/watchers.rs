// src/core/resolver/watchers.rs

//! Adapters that translate xDS client callbacks into serialized resolver
//! events.
//!
//! The xDS client delivers callbacks from its own threads; these adapters do
//! nothing but forward them onto the serializer. Both are safe to stop:
//! deliveries that race a cancellation are dropped at the adapter, before any
//! resolver state is touched.

use super::serializer::SerializerHandle;
use crate::core::errors::ResolverError;
use crate::core::xds::resources::{ListenerUpdate, RouteConfigUpdate};
use crate::core::xds::{ListenerWatcherCallbacks, RouteConfigWatcherCallbacks};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// The Listener (LDS) watcher adapter. Exactly one exists per resolver.
pub(crate) struct ListenerWatcher {
    serializer: SerializerHandle,
    stopped: AtomicBool,
}

impl ListenerWatcher {
    pub(crate) fn new(serializer: SerializerHandle) -> Arc<Self> {
        Arc::new(Self {
            serializer,
            stopped: AtomicBool::new(false),
        })
    }

    /// Stops the adapter: all further callbacks are ignored. Idempotent.
    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl ListenerWatcherCallbacks for ListenerWatcher {
    fn on_update(&self, update: ListenerUpdate) {
        if self.is_stopped() {
            debug!("dropping listener update delivered after watcher stop");
            return;
        }
        self.serializer.post(move |state| state.on_listener_update(update));
    }

    fn on_error(&self, err: ResolverError) {
        if self.is_stopped() {
            return;
        }
        self.serializer.post(move |state| state.on_listener_error(err));
    }

    fn on_resource_does_not_exist(&self) {
        if self.is_stopped() {
            return;
        }
        self.serializer
            .post(|state| state.on_listener_resource_not_found());
    }
}

/// The RouteConfiguration (RDS) watcher adapter. At most one is live at a
/// time, bound to a specific resource name; the name travels with every event
/// so the resolver can discard stale deliveries.
pub(crate) struct RouteConfigWatcher {
    resource_name: String,
    serializer: SerializerHandle,
    stopped: AtomicBool,
}

impl RouteConfigWatcher {
    pub(crate) fn new(resource_name: String, serializer: SerializerHandle) -> Arc<Self> {
        Arc::new(Self {
            resource_name,
            serializer,
            stopped: AtomicBool::new(false),
        })
    }

    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl RouteConfigWatcherCallbacks for RouteConfigWatcher {
    fn on_update(&self, update: RouteConfigUpdate) {
        if self.is_stopped() {
            debug!(
                resource = %self.resource_name,
                "dropping route config update delivered after watcher stop"
            );
            return;
        }
        let name = self.resource_name.clone();
        self.serializer
            .post(move |state| state.on_route_config_update(name, update));
    }

    fn on_error(&self, err: ResolverError) {
        if self.is_stopped() {
            return;
        }
        let name = self.resource_name.clone();
        self.serializer
            .post(move |state| state.on_route_config_error(name, err));
    }

    fn on_resource_does_not_exist(&self) {
        if self.is_stopped() {
            return;
        }
        let name = self.resource_name.clone();
        self.serializer
            .post(move |state| state.on_route_config_resource_not_found(name));
    }
}
