//! Column segments - the unit of eviction.
//!
//! A segment is one column of one chunk. Every encoding stores its data in
//! [`TypedBuffer`](crate::memory::TypedBuffer)s, so the whole segment can be
//! deep-copied onto another memory resource and its residency derived from
//! where its buffers live.

mod dictionary;
mod run_length;
mod value;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::memory::MemoryResource;
use crate::storage::{AccessCategory, SegmentAccessCounter};

pub use dictionary::DictionarySegment;
pub use run_length::RunLengthSegment;
pub use value::ValueSegment;

/// Shared handle to a segment.
pub type SegmentRef = Arc<dyn Segment>;

/// How precisely [`Segment::memory_usage`] should measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUsageMode {
    /// Data buffers only. Cheap, used by the statistics collector.
    Sampled,
    /// Data buffers plus per-segment bookkeeping.
    Full,
}

/// Encoding of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Unencoded,
    Dictionary,
    RunLength,
    FrameOfReference,
    Lz4,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentKind::Unencoded => "unencoded",
            SegmentKind::Dictionary => "dictionary",
            SegmentKind::RunLength => "run_length",
            SegmentKind::FrameOfReference => "frame_of_reference",
            SegmentKind::Lz4 => "lz4",
        };
        f.write_str(name)
    }
}

/// An immutable column segment of `i32` values.
///
/// # Thread Safety
/// Segments are shared between query threads and the eviction loop through
/// [`SegmentRef`]. Reads only touch immutable buffers and atomic counters.
pub trait Segment: Send + Sync + fmt::Debug {
    /// Number of rows.
    fn size(&self) -> usize;

    /// Bytes occupied by the segment.
    fn memory_usage(&self, mode: MemoryUsageMode) -> usize;

    /// The segment's access counters.
    fn access_counter(&self) -> &SegmentAccessCounter;

    /// Encoding of the segment.
    fn kind(&self) -> SegmentKind;

    /// Whether every buffer of the segment lives in primary memory.
    fn is_resident(&self) -> bool;

    /// Value at `offset` without recording an access.
    fn value_at(&self, offset: usize) -> Option<i32>;

    /// Deep-copy the segment onto `resource`.
    ///
    /// The copy gets a new counter carrying the current counts.
    fn copy_using_resource(&self, resource: &Arc<dyn MemoryResource>) -> Result<SegmentRef>;

    /// Point access, recorded as [`AccessCategory::Point`].
    fn get(&self, offset: usize) -> Option<i32> {
        self.access_counter().record(AccessCategory::Point, 1);
        self.value_at(offset)
    }

    /// Visit every value in order, recorded as one sequential access per row.
    fn scan(&self, visit: &mut dyn FnMut(i32)) {
        let size = self.size();
        self.access_counter()
            .record(AccessCategory::Sequential, size as u64);
        for offset in 0..size {
            if let Some(value) = self.value_at(offset) {
                visit(value);
            }
        }
    }

    /// Fetch the values at `positions`.
    ///
    /// Strictly increasing positions count as monotonic accesses, anything
    /// else as random accesses.
    fn gather(&self, positions: &[usize]) -> Vec<Option<i32>> {
        let category = if positions.windows(2).all(|w| w[0] < w[1]) {
            AccessCategory::Monotonic
        } else {
            AccessCategory::Random
        };
        self.access_counter()
            .record(category, positions.len() as u64);
        positions.iter().map(|&p| self.value_at(p)).collect()
    }

    /// All values, without recording an access.
    fn to_vec(&self) -> Vec<i32> {
        (0..self.size()).filter_map(|i| self.value_at(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_categories() {
        let segment = ValueSegment::new(&[10, 20, 30, 40]).unwrap();

        assert_eq!(segment.gather(&[0, 2, 3]), vec![Some(10), Some(30), Some(40)]);
        assert_eq!(segment.gather(&[3, 1]), vec![Some(40), Some(20)]);
        assert_eq!(segment.gather(&[1, 1]), vec![Some(20), Some(20)]);

        let counts = segment.access_counter().snapshot();
        assert_eq!(counts.monotonic, 3);
        assert_eq!(counts.random, 4);
    }

    #[test]
    fn test_scan_and_point() {
        let segment = ValueSegment::new(&[1, 2, 3]).unwrap();

        let mut sum = 0;
        segment.scan(&mut |v| sum += v);
        assert_eq!(sum, 6);
        assert_eq!(segment.get(1), Some(2));
        assert_eq!(segment.get(5), None);

        let counts = segment.access_counter().snapshot();
        assert_eq!(counts.sequential, 3);
        assert_eq!(counts.point, 2);
    }

    #[test]
    fn test_to_vec_does_not_count() {
        let segment = ValueSegment::new(&[5, 6]).unwrap();
        assert_eq!(segment.to_vec(), vec![5, 6]);
        assert_eq!(segment.access_counter().snapshot().total(), 0);
    }

    #[test]
    fn test_kind_display_and_serde() {
        assert_eq!(SegmentKind::RunLength.to_string(), "run_length");
        let json = serde_json::to_string(&SegmentKind::FrameOfReference).unwrap();
        assert_eq!(json, "\"frame_of_reference\"");
    }
}
