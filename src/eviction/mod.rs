//! Segment eviction: deciding which segments stay resident and moving the
//! rest into a tier.
//!
//! One cycle runs these steps in order:
//! ```text
//! StatisticsCollector ─► TimestampedStatistics ─► ValueModel ─► KnapsackSolver
//!                                                                     │
//!                                      resident set ◄─────────────────┘
//!                                           │
//!                                     SwapCoordinator ─► TierManager
//! ```
//!
//! [`AntiCachingManager`] drives the cycle from a [`PeriodicLoop`].

mod export;
mod knapsack;
mod manager;
mod periodic;
mod statistics;
mod stats;
mod swap;
mod value;

pub use export::{
    export_access_statistics, statistics_headers, write_access_statistics, META_HEADERS,
};
pub use knapsack::{KnapsackSolver, Selection, SolveStrategy, DEFAULT_MAX_DP_CELLS};
pub use manager::{AntiCachingManager, CycleReport};
pub use periodic::PeriodicLoop;
pub use statistics::{SegmentInfo, StatisticsCollector, TimestampedStatistics};
pub use stats::{EvictionStats, EvictionStatsSnapshot};
pub use swap::{SwapCoordinator, SwapReport};
pub use value::{AccessWeights, ValueModel};
