// src/core/service_config.rs

//! Formats the channel's service-configuration document from the
//! active-cluster table.

use crate::core::selector::ActiveClusters;
use serde_json::{Value, json};

/// The name of the top-level load-balancing policy in emitted configurations.
pub const CLUSTER_MANAGER_POLICY_NAME: &str = "xds_cluster_manager";

/// Builds the service-configuration document for the given table: a single
/// `xds_cluster_manager` policy whose children are exactly the table's
/// entries, each a `childPolicy` list carrying the recorded child-policy
/// config verbatim.
///
/// This is a pure function of the table. The caller is responsible for
/// pruning zero-reference entries first, and for substituting the empty
/// document `{}` when the table is empty and the nil selector is being
/// installed (which drives the channel into transient failure by convention).
pub fn service_config_json(clusters: &ActiveClusters) -> Value {
    let mut entries: Vec<_> = clusters.iter().collect();
    // Deterministic child order keeps emitted configs diffable.
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut children = serde_json::Map::with_capacity(entries.len());
    for (key, info) in entries {
        children.insert(
            key.to_string(),
            json!({ "childPolicy": [info.child_config()] }),
        );
    }

    let mut policy = serde_json::Map::with_capacity(1);
    policy.insert(
        CLUSTER_MANAGER_POLICY_NAME.to_string(),
        json!({ "children": children }),
    );

    json!({ "loadBalancingConfig": [policy] })
}
