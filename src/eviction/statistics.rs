//! Statistics collection and the timestamped history.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::common::SegmentId;
use crate::storage::{
    AccessCounts, Chunk, MemoryUsageMode, Segment, SegmentKind, StorageDirectory,
};

/// What the eviction loop knows about one segment at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    pub segment_id: SegmentId,
    pub memory_usage: usize,
    pub row_count: usize,
    pub access_counts: AccessCounts,
    pub kind: SegmentKind,
    pub resident: bool,
}

impl SegmentInfo {
    /// Describe `segment` as of now.
    pub fn from_segment(segment_id: SegmentId, segment: &dyn Segment) -> Self {
        Self {
            segment_id,
            memory_usage: segment.memory_usage(MemoryUsageMode::Sampled),
            row_count: segment.size(),
            access_counts: segment.access_counter().snapshot(),
            kind: segment.kind(),
            resident: segment.is_resident(),
        }
    }

    /// Same segment, different access counts.
    pub fn with_access_counts(&self, access_counts: AccessCounts) -> Self {
        Self {
            access_counts,
            ..self.clone()
        }
    }
}

/// Walks the storage directory and snapshots every eligible segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticsCollector {
    include_mutable_chunks: bool,
}

impl StatisticsCollector {
    /// Create a collector. Mutable chunks are skipped unless requested.
    pub fn new(include_mutable_chunks: bool) -> Self {
        Self {
            include_mutable_chunks,
        }
    }

    /// Snapshot every segment in (table, chunk, column) order.
    ///
    /// Returns an empty vector for a directory without eligible segments.
    pub fn collect(&self, directory: &StorageDirectory) -> Vec<SegmentInfo> {
        let mut infos = Vec::new();
        directory.for_each_segment(
            self.include_mutable_chunks,
            |id, _chunk: &Arc<Chunk>, segment| {
                infos.push(SegmentInfo::from_segment(id, segment.as_ref()));
            },
        );
        debug!(segments = infos.len(), "collected segment statistics");
        infos
    }
}

/// Statistics snapshots in timestamp order, pruned to a fixed capacity.
#[derive(Debug)]
pub struct TimestampedStatistics {
    entries: VecDeque<(Instant, Vec<SegmentInfo>)>,
    capacity: usize,
}

impl TimestampedStatistics {
    /// Create a history holding at most `capacity` snapshots (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a snapshot, pruning the oldest one when full.
    ///
    /// # Panics
    /// Panics if `timestamp` is older than the newest entry.
    pub fn push(&mut self, timestamp: Instant, infos: Vec<SegmentInfo>) {
        if let Some((last, _)) = self.entries.back() {
            assert!(timestamp >= *last, "statistics must be pushed in timestamp order");
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((timestamp, infos));
    }

    /// Number of retained snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no snapshot has been pushed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest snapshot.
    pub fn latest(&self) -> Option<&(Instant, Vec<SegmentInfo>)> {
        self.entries.back()
    }

    /// Snapshot before the newest one.
    pub fn previous(&self) -> Option<&(Instant, Vec<SegmentInfo>)> {
        self.entries.iter().rev().nth(1)
    }

    /// Retained snapshots, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &(Instant, Vec<SegmentInfo>)> {
        self.entries.iter()
    }

    /// The infos valuation should look at: the latest snapshot with access
    /// counts replaced by the activity since the previous snapshot.
    ///
    /// Segments that are new in the latest snapshot keep their raw counts.
    /// With a single snapshot the raw counts are used throughout.
    pub fn values_for_valuation(&self) -> Vec<SegmentInfo> {
        let Some((_, latest)) = self.latest() else {
            return Vec::new();
        };
        let Some((_, previous)) = self.previous() else {
            return latest.clone();
        };

        let before: HashMap<&SegmentId, &AccessCounts> = previous
            .iter()
            .map(|info| (&info.segment_id, &info.access_counts))
            .collect();

        latest
            .iter()
            .map(|info| match before.get(&info.segment_id) {
                Some(earlier) => {
                    info.with_access_counts(info.access_counts.saturating_sub(earlier))
                }
                None => info.clone(),
            })
            .collect()
    }

    /// Drop every snapshot.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
