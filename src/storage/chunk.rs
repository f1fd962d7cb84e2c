//! Chunks - horizontal partitions of a table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::common::ColumnId;
use crate::storage::segment::{MemoryUsageMode, Segment, SegmentRef};

/// A horizontal partition of a table holding one segment per column.
///
/// # Thread Safety
/// Each column slot is an `ArcSwap`, so [`Chunk::replace_segment`] publishes
/// a new segment atomically. Readers holding the previous `SegmentRef` keep
/// using it until they drop it; new readers observe the replacement.
#[derive(Debug)]
pub struct Chunk {
    /// `ArcSwap` needs a sized payload, hence the extra `Arc` layer.
    segments: Vec<ArcSwap<SegmentRef>>,
    mutable: AtomicBool,
}

impl Chunk {
    /// Create an immutable chunk.
    pub fn new(segments: Vec<SegmentRef>) -> Self {
        Self::with_mutability(segments, false)
    }

    /// Create a chunk that still accepts appends.
    pub fn new_mutable(segments: Vec<SegmentRef>) -> Self {
        Self::with_mutability(segments, true)
    }

    fn with_mutability(segments: Vec<SegmentRef>, mutable: bool) -> Self {
        Self {
            segments: segments.into_iter().map(ArcSwap::from_pointee).collect(),
            mutable: AtomicBool::new(mutable),
        }
    }

    /// Whether the chunk still accepts appends.
    pub fn is_mutable(&self) -> bool {
        self.mutable.load(Ordering::Acquire)
    }

    /// Mark the chunk immutable. It becomes eligible for eviction.
    pub fn finalize(&self) {
        self.mutable.store(false, Ordering::Release);
    }

    /// Number of column slots.
    pub fn column_count(&self) -> usize {
        self.segments.len()
    }

    /// Number of rows, taken from the first column.
    pub fn size(&self) -> usize {
        self.get_segment(ColumnId(0)).map_or(0, |s| s.size())
    }

    /// Current segment of `column_id`.
    pub fn get_segment(&self, column_id: ColumnId) -> Option<SegmentRef> {
        self.segments.get(column_id.index()).map(|slot| {
            let current = slot.load();
            Arc::clone(&**current)
        })
    }

    /// Atomically install `segment` in `column_id`, returning the previous one.
    ///
    /// Returns `None`, and installs nothing, if the column does not exist.
    pub fn replace_segment(&self, column_id: ColumnId, segment: SegmentRef) -> Option<SegmentRef> {
        let slot = self.segments.get(column_id.index())?;
        let previous = slot.swap(Arc::new(segment));
        Some(Arc::clone(&*previous))
    }

    /// Sum of the memory usage of all current segments.
    pub fn memory_usage(&self, mode: MemoryUsageMode) -> usize {
        self.segments
            .iter()
            .map(|slot| slot.load().memory_usage(mode))
            .sum()
    }
}
