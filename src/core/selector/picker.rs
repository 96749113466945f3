// src/core/selector/picker.rs

//! Weighted-random cluster selection with integer weights.

use crate::core::errors::ResolverError;
use crate::core::selector::clusters::ClusterKey;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// One pickable entry: the cluster key plus the per-weighted-cluster HTTP
/// filter overrides that ride along with a pick of this entry.
#[derive(Debug, Clone)]
pub struct PickEntry {
    pub key: ClusterKey,
    pub http_filter_overrides: HashMap<String, serde_json::Value>,
}

impl PickEntry {
    pub fn new(key: ClusterKey) -> Self {
        Self {
            key,
            http_filter_overrides: HashMap::new(),
        }
    }
}

/// A weighted-random picker over a fixed entry set. Distribution is stable by
/// weight only; each pick draws from a fresh random source, so two pickers
/// with identical weights behave identically.
#[derive(Debug)]
pub struct WeightedPicker {
    entries: Vec<PickEntry>,
    /// `cumulative[i]` is the sum of the weights of entries `0..=i`.
    cumulative: Vec<u64>,
    total: u64,
}

impl WeightedPicker {
    /// Builds a picker from `(weight, entry)` pairs. Zero-weight entries are
    /// unreachable and are dropped; a zero total weight is rejected.
    pub fn new(weighted: Vec<(u64, PickEntry)>) -> Result<Self, ResolverError> {
        let mut entries = Vec::with_capacity(weighted.len());
        let mut cumulative = Vec::with_capacity(weighted.len());
        let mut total: u64 = 0;
        for (weight, entry) in weighted {
            if weight == 0 {
                continue;
            }
            total += weight;
            cumulative.push(total);
            entries.push(entry);
        }
        if total == 0 {
            return Err(ResolverError::InvalidRoute(
                "weighted-cluster route has a total weight of zero".to_string(),
            ));
        }
        Ok(Self {
            entries,
            cumulative,
            total,
        })
    }

    pub fn pick(&self) -> &PickEntry {
        let mut rng = SmallRng::from_entropy();
        let draw = rng.gen_range(0..self.total);
        let index = self.cumulative.partition_point(|&c| c <= draw);
        &self.entries[index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
