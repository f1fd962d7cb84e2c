//! Anti-Caching Manager - the periodic evaluate-and-swap engine.
//!
//! The [`AntiCachingManager`] provides:
//! - Periodic statistics collection over a storage directory
//! - Value scoring and budgeted selection of resident segments
//! - Relocation of everything else into the configured tier
//! - Access statistics export

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::common::config::MIB;
use crate::common::{AntiCachingConfig, Error, Result, SegmentId};
use crate::eviction::{
    export_access_statistics, EvictionStats, EvictionStatsSnapshot, KnapsackSolver,
    PeriodicLoop, StatisticsCollector, SwapCoordinator, SwapReport, TimestampedStatistics,
};
use crate::memory::MemoryResourceRegistry;
use crate::storage::StorageDirectory;
use crate::tier::{create_tier_manager, TierManager};

/// Outcome of one evaluate-and-swap cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Segments that were valued.
    pub segments: usize,
    /// Segments selected to stay resident.
    pub selected: usize,
    /// Footprint of the selected segments.
    pub selected_bytes: u64,
    /// Footprint of all valued segments.
    pub total_bytes: u64,
    pub swap: SwapReport,
}

impl CycleReport {
    /// Segments that end the cycle outside primary memory.
    pub fn unselected(&self) -> usize {
        self.segments - self.selected
    }
}

/// State only the cycle touches. One cycle holds the lock from collection
/// to the end of the swap.
#[derive(Debug)]
struct EvictionState {
    history: TimestampedStatistics,
    coordinator: SwapCoordinator,
}

/// Everything the background thread shares with the manager handle.
#[derive(Debug)]
struct ManagerCore {
    config: AntiCachingConfig,
    directory: Arc<StorageDirectory>,
    collector: StatisticsCollector,
    solver: KnapsackSolver,
    state: Mutex<EvictionState>,
    stats: EvictionStats,
    initialized_at: Instant,
}

impl ManagerCore {
    fn run_cycle(&self) -> Result<CycleReport> {
        debug!("evaluating statistics");
        let mut state = self.state.lock();

        let timestamp = Instant::now();
        let current = self.collector.collect(&self.directory);
        if current.is_empty() {
            info!("no segments found");
            // Older snapshots describe segments that are gone
            state.coordinator.swap(&self.directory, &HashSet::new())?;
            return Ok(CycleReport::default());
        }
        state.history.push(timestamp, current);

        let infos = state.history.values_for_valuation();
        let values: Vec<f64> = infos
            .iter()
            .map(|info| self.config.value_model.compute_value(info))
            .collect();
        let costs: Vec<u64> = infos.iter().map(|info| info.memory_usage as u64).collect();

        let budget = self.config.memory_budget;
        let selection = self.solver.solve(budget, &values, &costs);
        if selection.total_cost > budget {
            return Err(Error::BudgetExceeded {
                cost: selection.total_cost,
                budget,
            });
        }

        let total_bytes: u64 = costs.iter().sum();
        let resident: HashSet<SegmentId> = selection
            .indices
            .iter()
            .map(|&i| infos[i].segment_id.clone())
            .collect();

        info!(
            "{} of {} segments evicted. {:.3} MB of {:.3} MB evicted. {:.2}% of memory budget used (memory budget: {:.3} MB)",
            infos.len() - resident.len(),
            infos.len(),
            (total_bytes - selection.total_cost) as f64 / MIB,
            total_bytes as f64 / MIB,
            100.0 * selection.total_cost as f64 / budget.max(1) as f64,
            budget as f64 / MIB,
        );

        let swap = state.coordinator.swap(&self.directory, &resident)?;
        self.stats.record_swap(&swap);
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        Ok(CycleReport {
            segments: infos.len(),
            selected: resident.len(),
            selected_bytes: selection.total_cost,
            total_bytes,
            swap,
        })
    }
}

/// Keeps a storage directory within a memory budget by evicting the
/// least valuable segments to a secondary tier.
///
/// # Architecture
/// ```text
/// ┌───────────────────────────────────────────────────────────────┐
/// │                     AntiCachingManager                        │
/// │  ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌─────────┐  │
/// │  │ collector │──▶│  history  │──▶│ValueModel │──▶│Knapsack │  │
/// │  └───────────┘   └───────────┘   └───────────┘   └────┬────┘  │
/// │        ▲                                              │       │
/// │        │           ┌──────────────────┐   resident    ▼       │
/// │  StorageDirectory ◀│  SwapCoordinator │◀──────────── set      │
/// │                    └────────┬─────────┘                       │
/// │                             ▼                                 │
/// │                       TierManager                             │
/// └───────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `state`: `Mutex`, held for a whole cycle; the background loop and
///   [`evaluate_statistics`](Self::evaluate_statistics) never interleave
/// - `stats`: no lock, atomic counters
/// - readers of the directory never block on a cycle; chunk slots are
///   swapped atomically
///
/// # Usage
/// ```ignore
/// let manager = AntiCachingManager::new(config, Arc::clone(&directory))?;
/// manager.start()?;
/// // ... queries run, segments move ...
/// manager.stop();
/// ```
pub struct AntiCachingManager {
    core: Arc<ManagerCore>,
    registry: MemoryResourceRegistry,
    worker: Mutex<Option<PeriodicLoop>>,
}

impl AntiCachingManager {
    /// Create a manager with the tier selected by the configuration.
    ///
    /// Backing files are created under `config.pool_directory`.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` if the configuration fails validation
    /// - `Error::Io` if a backing file cannot be created
    pub fn new(config: AntiCachingConfig, directory: Arc<StorageDirectory>) -> Result<Self> {
        config.validate()?;
        let registry = MemoryResourceRegistry::new(&config.pool_directory);
        let tier = create_tier_manager(&config, &registry)?;
        Ok(Self::assemble(config, directory, tier, registry))
    }

    /// Create a manager over an existing tier.
    pub fn with_tier(
        config: AntiCachingConfig,
        directory: Arc<StorageDirectory>,
        tier: Arc<dyn TierManager>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = MemoryResourceRegistry::new(&config.pool_directory);
        Ok(Self::assemble(config, directory, tier, registry))
    }

    fn assemble(
        config: AntiCachingConfig,
        directory: Arc<StorageDirectory>,
        tier: Arc<dyn TierManager>,
        registry: MemoryResourceRegistry,
    ) -> Self {
        info!(%config, tier = tier.name(), "anti-caching manager created");

        let coordinator = SwapCoordinator::new(tier, config.max_segment_footprint)
            .include_mutable_chunks(config.include_mutable_chunks);
        let state = EvictionState {
            history: TimestampedStatistics::new(config.statistics_history),
            coordinator,
        };

        let core = ManagerCore {
            collector: StatisticsCollector::new(config.include_mutable_chunks),
            solver: KnapsackSolver::new(config.capacity_unit),
            state: Mutex::new(state),
            stats: EvictionStats::new(),
            initialized_at: Instant::now(),
            directory,
            config,
        };

        Self {
            core: Arc::new(core),
            registry,
            worker: Mutex::new(None),
        }
    }

    // ========================================================================
    // Background loop
    // ========================================================================

    /// Start the background loop. Does nothing if it already runs.
    ///
    /// # Errors
    /// `Error::Io` if the thread cannot be spawned.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(PeriodicLoop::is_running) {
            warn!("anti-caching loop already running");
            return Ok(());
        }

        let core = Arc::clone(&self.core);
        let periodic = PeriodicLoop::spawn("anti-caching", self.core.config.interval(), move |_| {
            match core.run_cycle() {
                Ok(_) => ControlFlow::Continue(()),
                Err(err) if err.is_fatal() => {
                    core.stats.failed_cycles.fetch_add(1, Ordering::Relaxed);
                    error!(error = %err, "fatal error in eviction cycle, stopping");
                    ControlFlow::Break(())
                }
                Err(err) => {
                    core.stats.failed_cycles.fetch_add(1, Ordering::Relaxed);
                    error!(error = %err, "eviction cycle failed");
                    ControlFlow::Continue(())
                }
            }
        })?;

        info!(interval_ms = self.core.config.segment_eviction_interval_ms, "starting anti-caching");
        *worker = Some(periodic);
        Ok(())
    }

    /// Stop the background loop, waiting for an in-flight cycle.
    pub fn stop(&self) {
        if let Some(mut periodic) = self.worker.lock().take() {
            periodic.stop();
            info!(cycles = periodic.cycles(), "stopped anti-caching");
        }
    }

    /// Skip cycles until [`resume`](Self::resume).
    pub fn pause(&self) {
        if let Some(periodic) = self.worker.lock().as_ref() {
            periodic.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(periodic) = self.worker.lock().as_ref() {
            periodic.resume();
        }
    }

    /// Whether the background loop is running.
    pub fn is_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(PeriodicLoop::is_running)
    }

    // ========================================================================
    // Cycles and inspection
    // ========================================================================

    /// Run one evaluate-and-swap cycle on the calling thread.
    ///
    /// # Errors
    /// - `Error::FootprintExceeded` or `Error::BudgetExceeded` on a broken
    ///   invariant
    /// - resource errors are only returned when they are fatal; per-segment
    ///   failures show up in [`SwapReport::failed`]
    pub fn evaluate_statistics(&self) -> Result<CycleReport> {
        self.core.run_cycle().inspect_err(|_| {
            self.core.stats.failed_cycles.fetch_add(1, Ordering::Relaxed);
        })
    }

    /// Write the statistics history as meta and statistics CSV files.
    ///
    /// Returns the number of distinct segments written.
    pub fn export_access_statistics<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        meta_path: P,
        statistics_path: Q,
    ) -> Result<usize> {
        let state = self.core.state.lock();
        export_access_statistics(
            &state.history,
            self.core.initialized_at,
            meta_path,
            statistics_path,
        )
    }

    /// Zero the access counters of every segment in the directory.
    pub fn reset_access_statistics(&self) {
        self.core.directory.reset_access_counters();
        debug!("reset access statistics");
    }

    pub fn config(&self) -> &AntiCachingConfig {
        &self.core.config
    }

    pub fn directory(&self) -> &Arc<StorageDirectory> {
        &self.core.directory
    }

    /// Resources created for the tier.
    pub fn registry(&self) -> &MemoryResourceRegistry {
        &self.registry
    }

    /// The tier evicted segments live in.
    pub fn tier(&self) -> Arc<dyn TierManager> {
        Arc::clone(self.core.state.lock().coordinator.tier())
    }

    pub fn stats(&self) -> EvictionStatsSnapshot {
        self.core.stats.snapshot()
    }

    pub fn is_evicted(&self, id: &SegmentId) -> bool {
        self.core.state.lock().coordinator.is_evicted(id)
    }

    pub fn evicted_len(&self) -> usize {
        self.core.state.lock().coordinator.evicted_len()
    }

    /// Number of retained statistics snapshots.
    pub fn history_len(&self) -> usize {
        self.core.state.lock().history.len()
    }
}

impl Drop for AntiCachingManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AntiCachingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AntiCachingManager")
            .field("config", &self.core.config)
            .field("running", &self.is_running())
            .field("stats", &self.core.stats.snapshot())
            .finish()
    }
}
