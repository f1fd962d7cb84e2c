//! anticache - budgeted segment eviction for columnar in-memory tables.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           anticache                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Eviction Layer (eviction/)                  │   │
//! │  │  Collector → ValueModel → Knapsack → SwapCoordinator     │   │
//! │  │        driven by AntiCachingManager + PeriodicLoop       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Tier Layer (tier/)  [Configurable]          │   │
//! │  │   address_space | mmap | demand_paged | pmem             │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Memory Resources (memory/)                     │   │
//! │  │   Heap + Monotonic + Mmap + Pool, owned by a Registry    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↑                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                       │   │
//! │  │   StorageDirectory → Table → Chunk → Segment             │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (SegmentId, Error, config)
//! - [`storage`] - Tables, chunks, segments and access counters
//! - [`memory`] - Memory resources segment buffers are allocated from
//! - [`tier`] - Stores for evicted segment copies
//! - [`eviction`] - Statistics, valuation, selection and swapping
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//!
//! use anticache::storage::{SegmentRef, StorageDirectory, Table, ValueSegment};
//! use anticache::{AntiCachingConfig, AntiCachingManager};
//!
//! let directory = Arc::new(StorageDirectory::new());
//! let table = directory.add_table("orders", Table::new(["o_total"]));
//! let segment: SegmentRef = Arc::new(ValueSegment::new(&[1, 2, 3]).unwrap());
//! table.append_chunk(vec![segment]);
//!
//! let config = AntiCachingConfig::from_file("anti_caching.json").unwrap();
//! let manager = AntiCachingManager::new(config, directory).unwrap();
//! manager.start().unwrap();
//! ```

pub mod common;
pub mod eviction;
pub mod memory;
pub mod storage;
pub mod tier;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{
    AntiCachingConfig, ChunkId, ColumnId, Error, MemoryResourceType, Result, SegmentId,
};

pub use eviction::{AntiCachingManager, CycleReport, EvictionStatsSnapshot, KnapsackSolver};
pub use tier::{create_tier_manager, TierManager};
