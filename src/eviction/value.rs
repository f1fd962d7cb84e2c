//! Value model - how much keeping a segment resident is worth.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::eviction::SegmentInfo;
use crate::storage::{AccessCategory, AccessCounts, SegmentKind};

/// Weight of each access category for one segment kind.
///
/// A weight approximates how much more an access of that category costs
/// when the segment is not resident.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccessWeights {
    #[serde(default)]
    pub point: f64,
    #[serde(default)]
    pub sequential: f64,
    #[serde(default)]
    pub monotonic: f64,
    #[serde(default)]
    pub random: f64,
    #[serde(default)]
    pub dictionary: f64,
}

impl AccessWeights {
    pub const fn new(
        point: f64,
        sequential: f64,
        monotonic: f64,
        random: f64,
        dictionary: f64,
    ) -> Self {
        Self {
            point,
            sequential,
            monotonic,
            random,
            dictionary,
        }
    }

    /// Weight of one category.
    pub fn weight(&self, category: AccessCategory) -> f64 {
        match category {
            AccessCategory::Point => self.point,
            AccessCategory::Sequential => self.sequential,
            AccessCategory::Monotonic => self.monotonic,
            AccessCategory::Random => self.random,
            AccessCategory::Dictionary => self.dictionary,
        }
    }

    /// Weighted sum of `counts`.
    pub fn apply(&self, counts: &AccessCounts) -> f64 {
        AccessCategory::ALL
            .iter()
            .map(|&c| self.weight(c) * counts.get(c) as f64)
            .sum()
    }

    fn validate(&self, kind: &str) -> Result<()> {
        for category in AccessCategory::ALL {
            let weight = self.weight(category);
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "value_model weight {:?} of {} must be finite and >= 0, got {}",
                    category, kind, weight
                )));
            }
        }
        Ok(())
    }
}

impl Default for AccessWeights {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0, 1.0, 1.0)
    }
}

/// Maps segment statistics to a value for the knapsack.
///
/// `value = weights(kind) · access_counts - memory_cost_per_byte × memory_usage`
///
/// The weight table is a calibration: the defaults below rank accesses the
/// way a column store typically pays for them (random accesses to a paged
/// out segment fault far more than sequential scans), and deployments tune
/// them through the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueModel {
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<SegmentKind, AccessWeights>,

    /// Used for kinds missing from `weights`.
    #[serde(default)]
    pub fallback: AccessWeights,

    #[serde(default = "default_memory_cost_per_byte")]
    pub memory_cost_per_byte: f64,
}

fn default_weights() -> BTreeMap<SegmentKind, AccessWeights> {
    BTreeMap::from([
        (SegmentKind::Unencoded, AccessWeights::new(2.57, 1.0, 1.2, 2.57, 0.0)),
        (SegmentKind::Dictionary, AccessWeights::new(2.0, 0.8, 1.0, 2.0, 1.0)),
        (SegmentKind::RunLength, AccessWeights::new(3.5, 0.6, 1.5, 3.5, 0.0)),
        (SegmentKind::FrameOfReference, AccessWeights::new(3.0, 0.9, 1.3, 3.0, 0.0)),
        (SegmentKind::Lz4, AccessWeights::new(8.0, 1.5, 4.0, 8.0, 0.0)),
    ])
}

fn default_memory_cost_per_byte() -> f64 {
    1e-6
}

impl Default for ValueModel {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            fallback: AccessWeights::default(),
            memory_cost_per_byte: default_memory_cost_per_byte(),
        }
    }
}

impl ValueModel {
    /// A model that only counts accesses, with every weight set to 1.
    pub fn uniform() -> Self {
        Self {
            weights: BTreeMap::new(),
            fallback: AccessWeights::default(),
            memory_cost_per_byte: 0.0,
        }
    }

    /// Weights used for `kind`.
    pub fn weights_for(&self, kind: SegmentKind) -> &AccessWeights {
        self.weights.get(&kind).unwrap_or(&self.fallback)
    }

    /// Value of keeping the segment described by `info` resident.
    ///
    /// Deterministic; may be negative for large, idle segments.
    pub fn compute_value(&self, info: &SegmentInfo) -> f64 {
        self.weights_for(info.kind).apply(&info.access_counts)
            - self.memory_cost_per_byte * info.memory_usage as f64
    }

    /// Check that every weight is usable.
    pub fn validate(&self) -> Result<()> {
        for (kind, weights) in &self.weights {
            weights.validate(&kind.to_string())?;
        }
        self.fallback.validate("fallback")?;
        if !self.memory_cost_per_byte.is_finite() || self.memory_cost_per_byte < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "value_model memory_cost_per_byte must be finite and >= 0, got {}",
                self.memory_cost_per_byte
            )));
        }
        Ok(())
    }
}
