//! Configuration constants and the anti-caching configuration file.
//!
//! The configuration is a JSON document. Every field has a default, so an
//! empty object `{}` is a valid configuration:
//!
//! ```
//! use anticache::common::config::{AntiCachingConfig, MemoryResourceType};
//!
//! let config = AntiCachingConfig::from_json_str(
//!     r#"{ "memory_budget": 1048576, "memory_resource_type": "demand_paged" }"#,
//! ).unwrap();
//! assert_eq!(config.memory_budget, 1024 * 1024);
//! assert_eq!(config.memory_resource_type, MemoryResourceType::DemandPaged);
//! assert_eq!(config.segment_eviction_interval_ms, 10_000);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::eviction::ValueModel;

/// Size of a backing page in bytes (4KB).
///
/// Used as the fallback when the OS page size cannot be queried, and as the
/// rounding unit of the demand-paged tier's high-water mark.
pub const PAGE_SIZE: usize = 4096;

/// One mebibyte, used for log lines.
pub const MIB: f64 = 1024.0 * 1024.0;

/// Default capacity of a tier backend's file or pool (4 MiB).
pub const DEFAULT_POOL_SIZE: u64 = 4 * 1024 * 1024;

/// Default interval between eviction cycles.
pub const DEFAULT_EVICTION_INTERVAL_MS: u64 = 10_000;

/// Default number of statistics snapshots kept for delta computation.
pub const DEFAULT_STATISTICS_HISTORY: usize = 16;

/// Default ceiling for the footprint of a single relocated segment (1 GiB).
pub const DEFAULT_MAX_SEGMENT_FOOTPRINT: usize = 1024 * 1024 * 1024;

/// Which secondary-storage technology evicted segments are copied into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryResourceType {
    /// An in-process heap resource. Accounting only, no persistence.
    #[serde(alias = "heap")]
    AddressSpace,
    /// A fixed-size memory-mapped file used as an append-only arena.
    #[default]
    Mmap,
    /// A memory-mapped file whose written ranges are handed back to the OS
    /// and served by demand paging.
    #[serde(alias = "umap")]
    DemandPaged,
    /// A checksummed, file-backed object pool with real deallocation.
    #[serde(rename = "pmem", alias = "persistent_memory_pool")]
    PersistentPool,
}

impl fmt::Display for MemoryResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryResourceType::AddressSpace => "address_space",
            MemoryResourceType::Mmap => "mmap",
            MemoryResourceType::DemandPaged => "demand_paged",
            MemoryResourceType::PersistentPool => "pmem",
        };
        f.write_str(name)
    }
}

/// Configuration of the anti-caching manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiCachingConfig {
    /// Period of the evaluate-and-swap cycle in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub segment_eviction_interval_ms: u64,

    /// Capacity of the tier backend (file size or pool size) in bytes.
    #[serde(default = "default_pool_size", alias = "file_size")]
    pub pool_size: u64,

    /// Bytes of segment data allowed to stay resident in primary memory.
    #[serde(default = "default_memory_budget")]
    pub memory_budget: u64,

    /// Tier backend evicted segments are copied into.
    #[serde(default)]
    pub memory_resource_type: MemoryResourceType,

    /// Directory holding the backing files of file-based tiers.
    #[serde(default = "default_pool_directory")]
    pub pool_directory: PathBuf,

    /// Whether chunks that still accept appends take part in eviction.
    #[serde(default)]
    pub include_mutable_chunks: bool,

    /// Number of statistics snapshots kept before the oldest is pruned.
    #[serde(default = "default_statistics_history")]
    pub statistics_history: usize,

    /// Largest footprint a single relocated copy may have.
    #[serde(default = "default_max_segment_footprint")]
    pub max_segment_footprint: usize,

    /// Smallest capacity unit (bytes) of the knapsack table.
    #[serde(default = "default_capacity_unit")]
    pub capacity_unit: u64,

    /// Calibration table of the value model.
    #[serde(default)]
    pub value_model: ValueModel,
}

fn default_interval_ms() -> u64 { DEFAULT_EVICTION_INTERVAL_MS }
fn default_pool_size() -> u64 { DEFAULT_POOL_SIZE }
fn default_memory_budget() -> u64 { u64::MAX }
fn default_pool_directory() -> PathBuf { PathBuf::from(".") }
fn default_statistics_history() -> usize { DEFAULT_STATISTICS_HISTORY }
fn default_max_segment_footprint() -> usize { DEFAULT_MAX_SEGMENT_FOOTPRINT }
fn default_capacity_unit() -> u64 { 1 }

impl Default for AntiCachingConfig {
    fn default() -> Self {
        Self {
            segment_eviction_interval_ms: default_interval_ms(),
            pool_size: default_pool_size(),
            memory_budget: default_memory_budget(),
            memory_resource_type: MemoryResourceType::default(),
            pool_directory: default_pool_directory(),
            include_mutable_chunks: false,
            statistics_history: default_statistics_history(),
            max_segment_footprint: default_max_segment_footprint(),
            capacity_unit: default_capacity_unit(),
            value_model: ValueModel::default(),
        }
    }
}

impl AntiCachingConfig {
    /// Read and validate a JSON configuration file.
    ///
    /// # Errors
    /// - `Error::Io` if the file cannot be read
    /// - `Error::ConfigParse` if the file is not valid JSON for this schema
    /// - `Error::InvalidConfig` if a value fails validation
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a JSON configuration string.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.segment_eviction_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "segment_eviction_interval_ms must be > 0".into(),
            ));
        }
        if self.pool_size == 0 {
            return Err(Error::InvalidConfig("pool_size must be > 0".into()));
        }
        if self.statistics_history == 0 {
            return Err(Error::InvalidConfig("statistics_history must be > 0".into()));
        }
        if self.max_segment_footprint == 0 {
            return Err(Error::InvalidConfig("max_segment_footprint must be > 0".into()));
        }
        if self.capacity_unit == 0 {
            return Err(Error::InvalidConfig("capacity_unit must be > 0".into()));
        }
        if self.memory_resource_type == MemoryResourceType::DemandPaged
            && self.pool_size < PAGE_SIZE as u64
        {
            return Err(Error::InvalidConfig(format!(
                "demand_paged pool_size must hold at least one page ({} bytes)",
                PAGE_SIZE
            )));
        }
        self.value_model.validate()
    }

    /// The eviction interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.segment_eviction_interval_ms)
    }
}

impl fmt::Display for AntiCachingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segment_eviction_interval_ms: {}, pool_size: {}, memory_budget: {}, memory_resource_type: {}",
            self.segment_eviction_interval_ms,
            self.pool_size,
            self.memory_budget,
            self.memory_resource_type
        )
    }
}
