// src/core/selector/clusters.rs

//! The reference-counted active-cluster table.
//!
//! The table itself is confined to the resolver's serializer: only the core
//! inserts entries, replaces child configs, and prunes. The per-entry
//! reference count is the single piece of state shared with other threads,
//! because RPC completion callbacks decrement it from wherever they run.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Key prefix for CDS-backed clusters.
pub const CLUSTER_PREFIX: &str = "cluster:";
/// Key prefix for cluster-specifier-plugin results.
pub const CLUSTER_SPECIFIER_PLUGIN_PREFIX: &str = "csp:";

/// The prefixed string the downstream load-balancing policy routes on. The
/// prefix is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterKey(String);

impl ClusterKey {
    /// The key of a CDS-backed cluster: `cluster:<name>`.
    pub fn cluster(name: &str) -> Self {
        Self(format!("{CLUSTER_PREFIX}{name}"))
    }

    /// The key of a cluster-specifier-plugin result: `csp:<plugin-name>`.
    pub fn specifier_plugin(name: &str) -> Self {
        Self(format!("{CLUSTER_SPECIFIER_PLUGIN_PREFIX}{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of the active-cluster table: the reference count plus the child
/// load-balancing policy config recorded at the last selector build.
#[derive(Debug)]
pub struct ClusterInfo {
    key: ClusterKey,
    ref_count: AtomicI64,
    child_config: Mutex<serde_json::Value>,
}

impl ClusterInfo {
    pub fn new(key: ClusterKey) -> Self {
        Self {
            key,
            ref_count: AtomicI64::new(0),
            child_config: Mutex::new(serde_json::Value::Null),
        }
    }

    pub fn key(&self) -> &ClusterKey {
        &self.key
    }

    pub fn ref_count(&self) -> i64 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Takes one reference and returns the new count.
    pub fn acquire(&self) -> i64 {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Releases one reference and returns the new count. The caller that
    /// observes the transition to zero is responsible for scheduling a
    /// service-config regeneration.
    pub fn release(&self) -> i64 {
        let previous = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "cluster {} released below zero", self.key);
        previous - 1
    }

    /// Replaces the recorded child-policy config. Only the resolver core calls
    /// this, during selector builds.
    pub fn set_child_config(&self, config: serde_json::Value) {
        *self.child_config.lock() = config;
    }

    pub fn child_config(&self) -> serde_json::Value {
        self.child_config.lock().clone()
    }
}

/// The active-cluster table: the sole source of truth for which clusters the
/// emitted service configuration lists.
#[derive(Debug, Default)]
pub struct ActiveClusters {
    entries: HashMap<ClusterKey, Arc<ClusterInfo>>,
}

impl ActiveClusters {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the entry for `key`, inserting a zero-reference entry if absent.
    pub fn add_or_get(&mut self, key: &ClusterKey) -> Arc<ClusterInfo> {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ClusterInfo::new(key.clone())))
            .clone()
    }

    /// Removes every entry whose reference count is zero and returns how many
    /// were removed. Selectors hold one reference per reachable cluster, so a
    /// zero count implies no live selector route references the entry either.
    pub fn prune_unreferenced(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, info| info.ref_count() > 0);
        before - self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &ClusterKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &ClusterKey) -> Option<&Arc<ClusterInfo>> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClusterKey, &Arc<ClusterInfo>)> {
        self.entries.iter()
    }
}
