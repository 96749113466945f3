// src/core/channel.rs

//! The channel-facing interface consumed by the resolver.
//!
//! The resolver never talks to the RPC machinery directly; it pushes state
//! through the [`ClientChannel`] capability trait and receives per-RPC pick
//! requests through the config selector. All three channel entry points are
//! assumed to be non-blocking and re-entrant-safe.

use crate::core::errors::ResolverError;
use crate::core::selector::ConfigSelector;
use std::sync::Arc;

/// An already-parsed service configuration, as produced by the channel's own
/// parser. The resolver treats it as opaque and hands it back unchanged in
/// [`ResolverUpdate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedServiceConfig {
    pub raw: serde_json::Value,
}

/// A single state update pushed from the resolver to the channel.
#[derive(Clone)]
pub struct ResolverUpdate {
    /// The parsed service configuration describing the cluster-manager children.
    pub service_config: ParsedServiceConfig,
    /// The config selector the channel must use for new RPCs. `None` installs
    /// the nil selector: new RPCs fail while in-flight RPCs drain.
    pub config_selector: Option<Arc<ConfigSelector>>,
}

impl std::fmt::Debug for ResolverUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverUpdate")
            .field("service_config", &self.service_config)
            .field("has_selector", &self.config_selector.is_some())
            .finish()
    }
}

/// The capabilities the resolver requires from the owning channel.
pub trait ClientChannel: Send + Sync {
    /// Pushes a new service configuration and config selector to the channel.
    /// An `Err` return means the channel rejected the update.
    fn update_state(&self, update: ResolverUpdate) -> Result<(), ResolverError>;

    /// Surfaces a non-fatal resolver error to the channel.
    fn report_error(&self, err: ResolverError);

    /// Parses a service-configuration JSON document with the channel's parser.
    fn parse_service_config(&self, json: &str) -> Result<ParsedServiceConfig, String>;
}

/// The per-RPC information the channel passes to a config selector's pick.
#[derive(Debug, Clone, Default)]
pub struct RpcInfo {
    /// The full method path of the RPC, e.g. `/pkg.Service/Method`.
    pub method: String,
    /// The outgoing request headers, in insertion order. Multiple values for
    /// the same name are allowed.
    pub headers: Vec<(String, String)>,
}

impl RpcInfo {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            headers: Vec::new(),
        }
    }

    /// Builder-style helper to attach a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the value of `name` for header matching: a case-insensitive
    /// lookup with multiple values joined by `,`. Binary headers (`-bin`
    /// suffix) are never available to route matching.
    pub fn header_value(&self, name: &str) -> Option<String> {
        if name.ends_with("-bin") {
            return None;
        }
        let values: Vec<&str> = self
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(","))
        }
    }
}
