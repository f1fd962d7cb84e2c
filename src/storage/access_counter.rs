//! Per-segment access counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Categories of segment access, as recorded by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessCategory {
    /// A single-offset lookup.
    Point,
    /// A full scan, counted per row.
    Sequential,
    /// A gather over strictly increasing positions, counted per position.
    Monotonic,
    /// A gather over unordered positions, counted per position.
    Random,
    /// A dictionary lookup (value to code), counted per lookup.
    Dictionary,
}

impl AccessCategory {
    /// All categories in counter order.
    pub const ALL: [AccessCategory; 5] = [
        AccessCategory::Point,
        AccessCategory::Sequential,
        AccessCategory::Monotonic,
        AccessCategory::Random,
        AccessCategory::Dictionary,
    ];
}

/// Access counters attached to every segment.
///
/// All fields are atomic, so query threads record accesses without locks
/// while the statistics collector reads them.
///
/// # Memory Ordering
/// `Ordering::Relaxed` throughout: each counter only needs atomicity, and a
/// snapshot taken concurrently with recording may be off by in-flight
/// increments, which the valuation tolerates.
#[derive(Debug, Default)]
pub struct SegmentAccessCounter {
    point: AtomicU64,
    sequential: AtomicU64,
    monotonic: AtomicU64,
    random: AtomicU64,
    dictionary: AtomicU64,
}

impl SegmentAccessCounter {
    /// Create a counter with everything at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a counter pre-loaded with `counts`.
    pub fn from_counts(counts: AccessCounts) -> Self {
        let counter = Self::new();
        counter.set(counts);
        counter
    }

    fn slot(&self, category: AccessCategory) -> &AtomicU64 {
        match category {
            AccessCategory::Point => &self.point,
            AccessCategory::Sequential => &self.sequential,
            AccessCategory::Monotonic => &self.monotonic,
            AccessCategory::Random => &self.random,
            AccessCategory::Dictionary => &self.dictionary,
        }
    }

    /// Record `n` accesses of `category`.
    #[inline]
    pub fn record(&self, category: AccessCategory, n: u64) {
        self.slot(category).fetch_add(n, Ordering::Relaxed);
    }

    /// Get a snapshot of the current counts.
    pub fn snapshot(&self) -> AccessCounts {
        AccessCounts {
            point: self.point.load(Ordering::Relaxed),
            sequential: self.sequential.load(Ordering::Relaxed),
            monotonic: self.monotonic.load(Ordering::Relaxed),
            random: self.random.load(Ordering::Relaxed),
            dictionary: self.dictionary.load(Ordering::Relaxed),
        }
    }

    /// Overwrite every counter with `counts`.
    pub fn set(&self, counts: AccessCounts) {
        for category in AccessCategory::ALL {
            self.slot(category).store(counts.get(category), Ordering::Relaxed);
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.set(AccessCounts::default());
    }
}

/// A point-in-time copy of a [`SegmentAccessCounter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCounts {
    pub point: u64,
    pub sequential: u64,
    pub monotonic: u64,
    pub random: u64,
    pub dictionary: u64,
}

impl AccessCounts {
    /// CSV column names, in the order written by [`AccessCounts::to_csv`].
    pub const HEADERS: &'static str = "point,sequential,monotonic,random,dictionary";

    /// Count for one category.
    pub fn get(&self, category: AccessCategory) -> u64 {
        match category {
            AccessCategory::Point => self.point,
            AccessCategory::Sequential => self.sequential,
            AccessCategory::Monotonic => self.monotonic,
            AccessCategory::Random => self.random,
            AccessCategory::Dictionary => self.dictionary,
        }
    }

    /// Sum over all categories.
    pub fn total(&self) -> u64 {
        AccessCategory::ALL.iter().map(|&c| self.get(c)).sum()
    }

    /// Per-category difference `self - earlier`, clamped at zero.
    ///
    /// Counters can go backwards when they are reset between snapshots.
    pub fn saturating_sub(&self, earlier: &AccessCounts) -> AccessCounts {
        AccessCounts {
            point: self.point.saturating_sub(earlier.point),
            sequential: self.sequential.saturating_sub(earlier.sequential),
            monotonic: self.monotonic.saturating_sub(earlier.monotonic),
            random: self.random.saturating_sub(earlier.random),
            dictionary: self.dictionary.saturating_sub(earlier.dictionary),
        }
    }

    /// Counts as a CSV fragment matching [`AccessCounts::HEADERS`].
    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.point, self.sequential, self.monotonic, self.random, self.dictionary
        )
    }
}

impl fmt::Display for AccessCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Accesses {{ point: {}, sequential: {}, monotonic: {}, random: {}, dictionary: {} }}",
            self.point, self.sequential, self.monotonic, self.random, self.dictionary
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_new() {
        let counter = SegmentAccessCounter::new();
        assert_eq!(counter.snapshot(), AccessCounts::default());
        assert_eq!(counter.snapshot().total(), 0);
    }

    #[test]
    fn test_record_and_snapshot() {
        let counter = SegmentAccessCounter::new();
        counter.record(AccessCategory::Point, 3);
        counter.record(AccessCategory::Sequential, 100);
        counter.record(AccessCategory::Random, 7);

        let snapshot = counter.snapshot();
        assert_eq!(snapshot.point, 3);
        assert_eq!(snapshot.sequential, 100);
        assert_eq!(snapshot.random, 7);
        assert_eq!(snapshot.total(), 110);
    }

    #[test]
    fn test_set_and_reset() {
        let counts = AccessCounts {
            point: 1,
            sequential: 2,
            monotonic: 3,
            random: 4,
            dictionary: 5,
        };
        let counter = SegmentAccessCounter::from_counts(counts);
        assert_eq!(counter.snapshot(), counts);

        counter.reset();
        assert_eq!(counter.snapshot().total(), 0);
    }

    #[test]
    fn test_saturating_sub() {
        let earlier = AccessCounts {
            point: 10,
            sequential: 5,
            ..Default::default()
        };
        let later = AccessCounts {
            point: 15,
            sequential: 2,
            ..Default::default()
        };

        let delta = later.saturating_sub(&earlier);
        assert_eq!(delta.point, 5);
        assert_eq!(delta.sequential, 0);
    }

    #[test]
    fn test_csv_and_display() {
        let counts = AccessCounts {
            point: 1,
            dictionary: 9,
            ..Default::default()
        };
        assert_eq!(counts.to_csv(), "1,0,0,0,9");
        assert_eq!(AccessCounts::HEADERS.split(',').count(), 5);
        assert!(format!("{}", counts).contains("dictionary: 9"));
    }

    #[test]
    fn test_concurrent_recording() {
        let counter = std::sync::Arc::new(SegmentAccessCounter::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.record(AccessCategory::Point, 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.snapshot().point, 4000);
    }
}
