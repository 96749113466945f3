// src/core/errors.rs

//! Defines the primary error type for the resolver.

use thiserror::Error;

/// The main error enum, representing all possible failures within the resolver.
/// Using `thiserror` allows for clean error definitions; the rendered messages
/// are forwarded verbatim to the channel via `report_error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("Bootstrap Error: {0}")]
    Bootstrap(String),

    #[error("Bootstrap configuration is empty")]
    EmptyBootstrap,

    #[error("xDS credentials in use, but no certificate providers found in bootstrap")]
    MissingCertProviders,

    #[error("Authority '{0}' is not present in the bootstrap authorities map")]
    AuthorityNotFound(String),

    #[error("Invalid target '{0}': {1}")]
    InvalidTarget(String, String),

    #[error("xDS Client Error: {0}")]
    XdsClient(String),

    #[error("Resource '{0}' does not exist")]
    ResourceNotFound(String),

    #[error("No matching virtual host found for '{0}'")]
    NoMatchingVirtualHost(String),

    #[error("Invalid route configuration: {0}")]
    InvalidRoute(String),

    #[error("Service config generation failed: {0}")]
    ServiceConfig(String),

    #[error("Channel rejected the resolver state update")]
    ChannelRejected,

    #[error("No matching route found for RPC '{0}'")]
    NoMatchingRoute(String),

    #[error("Matched route is a non-forwarding action")]
    NonForwardingAction,

    #[error("Matched route has an unsupported action type")]
    UnsupportedRouteAction,

    #[error("Config selector is stopped")]
    SelectorStopped,

    #[error("Internal Resolver Error: {0}")]
    Internal(String),
}
