// src/core/xds/mod.rs

//! The capability interface of the xDS client consumed by the resolver.
//!
//! The real client (ADS transport, resource caching, watcher dispatch) lives
//! outside this crate. The resolver depends only on the traits defined here,
//! which makes every collaborator swappable in tests.

use crate::config::BootstrapConfig;
use crate::core::errors::ResolverError;
use once_cell::sync::OnceCell;
use std::sync::Arc;

pub mod resources;

pub use resources::{ListenerUpdate, RouteConfigUpdate};

/// Callbacks delivered for a watched Listener resource.
///
/// The client may invoke these from arbitrary threads; implementations must
/// serialize internally. Callbacks arriving after the watch was cancelled must
/// be tolerated (in-flight deliveries are allowed to race cancellation).
pub trait ListenerWatcherCallbacks: Send + Sync {
    /// A new validated version of the resource arrived.
    fn on_update(&self, update: ListenerUpdate);
    /// A transient, non-terminal error (connection loss, NACKed update).
    fn on_error(&self, err: ResolverError);
    /// The control plane no longer has the resource.
    fn on_resource_does_not_exist(&self);
}

/// Callbacks delivered for a watched RouteConfiguration resource.
pub trait RouteConfigWatcherCallbacks: Send + Sync {
    fn on_update(&self, update: RouteConfigUpdate);
    fn on_error(&self, err: ResolverError);
    fn on_resource_does_not_exist(&self);
}

/// A cancellation guard for an active resource watch. The watch is cancelled
/// by calling [`WatchHandle::cancel`] or by dropping the handle.
pub struct WatchHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle that does nothing on cancellation, for clients whose watches
    /// need no explicit teardown.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// The xDS client capabilities the resolver requires.
pub trait XdsClient: Send + Sync {
    /// Registers a watch on a Listener resource. Callbacks fire until the
    /// returned handle is cancelled.
    fn watch_listener(
        &self,
        resource_name: &str,
        watcher: Arc<dyn ListenerWatcherCallbacks>,
    ) -> WatchHandle;

    /// Registers a watch on a RouteConfiguration resource.
    fn watch_route_config(
        &self,
        resource_name: &str,
        watcher: Arc<dyn RouteConfigWatcherCallbacks>,
    ) -> WatchHandle;

    /// The bootstrap configuration the client was created from.
    fn bootstrap(&self) -> Arc<BootstrapConfig>;

    /// Releases one reference to the client. The resolver holds exactly one
    /// reference from build to close.
    fn close(&self);
}

/// Produces xDS clients for resolvers. Injectable so parallel tests can run
/// with distinct bootstraps.
pub trait ClientFactory: Send + Sync {
    fn new_client(&self) -> Result<Arc<dyn XdsClient>, ResolverError>;
}

static SHARED_CLIENT: OnceCell<Arc<dyn XdsClient>> = OnceCell::new();

/// Registers the process-wide shared xDS client handed out by
/// [`SharedClientFactory`]. Returns an error if a client was already
/// registered.
pub fn register_shared_client(client: Arc<dyn XdsClient>) -> Result<(), ResolverError> {
    SHARED_CLIENT
        .set(client)
        .map_err(|_| ResolverError::XdsClient("shared xDS client already registered".to_string()))
}

/// The default [`ClientFactory`]: returns the process-wide shared client.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedClientFactory;

impl ClientFactory for SharedClientFactory {
    fn new_client(&self) -> Result<Arc<dyn XdsClient>, ResolverError> {
        SHARED_CLIENT
            .get()
            .cloned()
            .ok_or_else(|| ResolverError::XdsClient("no shared xDS client registered".to_string()))
    }
}
