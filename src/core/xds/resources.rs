// src/core/xds/resources.rs

//! Resource views delivered by the xDS client.
//!
//! These are already-validated, transport-independent projections of the
//! Listener and RouteConfiguration resources. Wire parsing happens inside the
//! xDS client; the resolver only ever sees these views.

use std::collections::HashMap;
use std::time::Duration;

/// An HTTP filter installed on the Listener, in execution order. The `config`
/// payload is opaque to the resolver and is composed with per-virtual-host,
/// per-route, and per-weighted-cluster overrides at pick time.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpFilterSpec {
    pub name: String,
    pub config: serde_json::Value,
}

/// Where the Listener sources its routing table from. The two variants are
/// exclusive: an inline RouteConfiguration never coexists with an RDS
/// subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteSource {
    /// The RouteConfiguration was inlined into the Listener resource.
    Inline(RouteConfigUpdate),
    /// The name of the RouteConfiguration resource to subscribe to via RDS.
    Rds(String),
}

/// A validated Listener (LDS) resource update.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerUpdate {
    /// The HTTP filters of the Listener's HTTP connection manager, in order.
    pub http_filters: Vec<HttpFilterSpec>,
    /// The default maximum stream duration for routes that do not set their own.
    pub max_stream_duration: Option<Duration>,
    pub route_source: RouteSource,
}

/// A validated RouteConfiguration (RDS) resource update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteConfigUpdate {
    pub virtual_hosts: Vec<VirtualHost>,
}

/// A single virtual host and its routing table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VirtualHost {
    /// Domain patterns this virtual host serves. Supports exact entries,
    /// a single leading or trailing `*` wildcard, and the universal `*`.
    pub domains: Vec<String>,
    /// Routes in match order; the first matching route wins.
    pub routes: Vec<Route>,
    /// Per-virtual-host HTTP filter config overrides, keyed by filter name.
    pub http_filter_overrides: HashMap<String, serde_json::Value>,
    /// The retry policy applied to routes that do not carry their own.
    pub retry_policy: Option<RetryPolicy>,
}

/// A single route: a match predicate plus the action taken on a match.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub matcher: RouteMatchSpec,
    pub action: RouteAction,
    /// Maximum stream duration for RPCs on this route. Falls back to the
    /// Listener default when unset.
    pub max_stream_duration: Option<Duration>,
    /// Per-route HTTP filter config overrides, keyed by filter name.
    pub http_filter_overrides: HashMap<String, serde_json::Value>,
    pub retry_policy: Option<RetryPolicy>,
    pub hash_policies: Vec<HashPolicy>,
}

/// The action side of a route.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteAction {
    /// Forward to one of a set of weighted clusters. A single-cluster route is
    /// represented as one entry with weight 1.
    WeightedClusters(Vec<WeightedClusterSpec>),
    /// Forward to the result of a cluster-specifier plugin. `config` is the
    /// plugin's balancer configuration, recorded verbatim as the child policy.
    ClusterSpecifierPlugin {
        name: String,
        config: serde_json::Value,
    },
    /// A valid route that does not forward RPCs (e.g. a direct response).
    NonForwarding,
    /// A route action this client does not implement.
    Unsupported,
}

/// One entry of a weighted-cluster route action.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedClusterSpec {
    pub name: String,
    pub weight: u32,
    /// Per-weighted-cluster HTTP filter config overrides. These take the
    /// highest precedence during filter composition.
    pub http_filter_overrides: HashMap<String, serde_json::Value>,
}

impl WeightedClusterSpec {
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
            http_filter_overrides: HashMap::new(),
        }
    }
}

/// The retry policy view attached to a virtual host or route.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RetryPolicy {
    /// Canonical status-code names that are retryable, e.g. `"unavailable"`.
    pub retry_on: Vec<String>,
    /// Maximum number of retry attempts.
    pub num_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

/// A request-hashing policy carried by a route, returned verbatim in pick
/// results for consistent-hashing load balancers.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPolicy {
    pub kind: HashPolicyKind,
    /// When true, hash evaluation stops at this policy if it produced a hash.
    pub terminal: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HashPolicyKind {
    /// Hash over a request header, optionally rewritten by a regex
    /// substitution before hashing.
    Header {
        header_name: String,
        regex: Option<String>,
        regex_substitution: Option<String>,
    },
    /// Hash over the channel's unique identity.
    ChannelId,
}

/// The match predicate of a route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatchSpec {
    pub path: PathMatchSpec,
    pub headers: Vec<HeaderMatchSpec>,
    /// When set, the route only matches this fraction of otherwise-matching
    /// RPCs (used for traffic splitting during rollouts).
    pub fraction: Option<FractionSpec>,
}

impl RouteMatchSpec {
    /// A match-everything predicate (`prefix: ""`).
    pub fn any() -> Self {
        Self {
            path: PathMatchSpec::Prefix {
                prefix: String::new(),
                case_insensitive: false,
            },
            headers: Vec::new(),
            fraction: None,
        }
    }
}

/// The path predicate of a route matcher.
#[derive(Debug, Clone, PartialEq)]
pub enum PathMatchSpec {
    Exact { path: String, case_insensitive: bool },
    Prefix { prefix: String, case_insensitive: bool },
    /// A safe regex that must match the full method path.
    SafeRegex(String),
}

/// A header predicate of a route matcher. The match result is inverted when
/// `invert` is set, including for absent headers.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMatchSpec {
    pub name: String,
    pub invert: bool,
    pub kind: HeaderMatchKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderMatchKind {
    Exact(String),
    /// A safe regex that must match the full header value.
    SafeRegex(String),
    /// Matches when the value parses as an integer in `[start, end)`.
    Range { start: i64, end: i64 },
    /// Matches on header presence (`true`) or absence (`false`).
    Present(bool),
    Prefix(String),
    Suffix(String),
}

/// A runtime fraction: matches `numerator` out of every `denominator` RPCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FractionSpec {
    pub numerator: u32,
    pub denominator: u32,
}
