//! Eviction statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::eviction::SwapReport;

/// Counters kept across eviction cycles.
///
/// All fields are atomic so the background loop can update them while other
/// threads read a snapshot.
///
/// # Memory Ordering
/// `Ordering::Relaxed` everywhere: counters are independent and only need to
/// be eventually consistent.
#[derive(Debug, Default)]
pub struct EvictionStats {
    /// Completed evaluate-and-swap cycles.
    pub cycles: AtomicU64,

    /// Cycles that ended in an error.
    pub failed_cycles: AtomicU64,

    /// Segments copied into the tier for the first time.
    pub segments_persisted: AtomicU64,

    /// Segments replaced by their tier copy.
    pub segments_evicted: AtomicU64,

    /// Segments copied back into primary memory.
    pub segments_restored: AtomicU64,

    /// Bytes moved out of primary memory.
    pub bytes_evicted: AtomicU64,

    /// Bytes moved back into primary memory.
    pub bytes_restored: AtomicU64,

    /// Per-segment transitions that failed and were skipped.
    pub failed_swaps: AtomicU64,
}

impl EvictionStats {
    /// Create a tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the outcome of one swap pass.
    pub fn record_swap(&self, report: &SwapReport) {
        self.segments_persisted
            .fetch_add(report.persisted as u64, Ordering::Relaxed);
        self.segments_evicted
            .fetch_add(report.evicted as u64, Ordering::Relaxed);
        self.segments_restored
            .fetch_add(report.restored as u64, Ordering::Relaxed);
        self.bytes_evicted
            .fetch_add(report.bytes_evicted as u64, Ordering::Relaxed);
        self.bytes_restored
            .fetch_add(report.bytes_restored as u64, Ordering::Relaxed);
        self.failed_swaps
            .fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> EvictionStatsSnapshot {
        EvictionStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            failed_cycles: self.failed_cycles.load(Ordering::Relaxed),
            segments_persisted: self.segments_persisted.load(Ordering::Relaxed),
            segments_evicted: self.segments_evicted.load(Ordering::Relaxed),
            segments_restored: self.segments_restored.load(Ordering::Relaxed),
            bytes_evicted: self.bytes_evicted.load(Ordering::Relaxed),
            bytes_restored: self.bytes_restored.load(Ordering::Relaxed),
            failed_swaps: self.failed_swaps.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.cycles.store(0, Ordering::Relaxed);
        self.failed_cycles.store(0, Ordering::Relaxed);
        self.segments_persisted.store(0, Ordering::Relaxed);
        self.segments_evicted.store(0, Ordering::Relaxed);
        self.segments_restored.store(0, Ordering::Relaxed);
        self.bytes_evicted.store(0, Ordering::Relaxed);
        self.bytes_restored.store(0, Ordering::Relaxed);
        self.failed_swaps.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time copy of [`EvictionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionStatsSnapshot {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub segments_persisted: u64,
    pub segments_evicted: u64,
    pub segments_restored: u64,
    pub bytes_evicted: u64,
    pub bytes_restored: u64,
    pub failed_swaps: u64,
}

impl fmt::Display for EvictionStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ cycles: {}, evicted: {}, restored: {}, persisted: {}, failed: {} }}",
            self.cycles,
            self.segments_evicted,
            self.segments_restored,
            self.segments_persisted,
            self.failed_swaps
        )
    }
}
