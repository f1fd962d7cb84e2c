use std::sync::Arc;

use crate::common::Result;
use crate::memory::{HeapResource, MemoryResource, TypedBuffer};
use crate::storage::segment::{MemoryUsageMode, Segment, SegmentKind, SegmentRef};
use crate::storage::SegmentAccessCounter;

/// A run-length encoded segment.
///
/// Run `i` holds `values[i]` for every row up to and including
/// `end_positions[i]`.
#[derive(Debug)]
pub struct RunLengthSegment {
    values: TypedBuffer<i32>,
    end_positions: TypedBuffer<u32>,
    access_counter: SegmentAccessCounter,
}

impl RunLengthSegment {
    /// Encode `values` on the primary heap.
    pub fn from_values(values: &[i32]) -> Result<Self> {
        Self::with_resource(values, &HeapResource::shared())
    }

    /// Encode `values` with both buffers on `resource`.
    pub fn with_resource(values: &[i32], resource: &Arc<dyn MemoryResource>) -> Result<Self> {
        let mut run_values = Vec::new();
        let mut end_positions = Vec::new();

        for (row, &value) in values.iter().enumerate() {
            if run_values.last() == Some(&value) {
                if let Some(end) = end_positions.last_mut() {
                    *end = row as u32;
                }
            } else {
                run_values.push(value);
                end_positions.push(row as u32);
            }
        }

        Ok(Self {
            values: TypedBuffer::from_slice(resource, &run_values)?,
            end_positions: TypedBuffer::from_slice(resource, &end_positions)?,
            access_counter: SegmentAccessCounter::new(),
        })
    }

    /// Number of runs.
    pub fn run_count(&self) -> usize {
        self.values.len()
    }
}

impl Segment for RunLengthSegment {
    fn size(&self) -> usize {
        self.end_positions
            .as_slice()
            .last()
            .map_or(0, |&end| end as usize + 1)
    }

    fn memory_usage(&self, mode: MemoryUsageMode) -> usize {
        let data = self.values.byte_len() + self.end_positions.byte_len();
        match mode {
            MemoryUsageMode::Sampled => data,
            MemoryUsageMode::Full => std::mem::size_of::<Self>() + data,
        }
    }

    fn access_counter(&self) -> &SegmentAccessCounter {
        &self.access_counter
    }

    fn kind(&self) -> SegmentKind {
        SegmentKind::RunLength
    }

    fn is_resident(&self) -> bool {
        self.values.resource().is_primary() && self.end_positions.resource().is_primary()
    }

    fn value_at(&self, offset: usize) -> Option<i32> {
        let ends = self.end_positions.as_slice();
        let run = ends.partition_point(|&end| (end as usize) < offset);
        self.values.as_slice().get(run).copied()
    }

    fn copy_using_resource(&self, resource: &Arc<dyn MemoryResource>) -> Result<SegmentRef> {
        Ok(Arc::new(Self {
            values: TypedBuffer::from_slice(resource, self.values.as_slice())?,
            end_positions: TypedBuffer::from_slice(resource, self.end_positions.as_slice())?,
            access_counter: SegmentAccessCounter::from_counts(self.access_counter.snapshot()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs() {
        let segment = RunLengthSegment::from_values(&[4, 4, 4, 9, 9, 4]).unwrap();
        assert_eq!(segment.run_count(), 3);
        assert_eq!(segment.size(), 6);
        assert_eq!(segment.to_vec(), vec![4, 4, 4, 9, 9, 4]);
        assert_eq!(segment.value_at(6), None);
    }

    #[test]
    fn test_empty() {
        let segment = RunLengthSegment::from_values(&[]).unwrap();
        assert_eq!(segment.size(), 0);
        assert_eq!(segment.memory_usage(MemoryUsageMode::Sampled), 0);
        assert!(segment.is_resident());
    }

    #[test]
    fn test_copy() {
        let secondary: Arc<dyn MemoryResource> = Arc::new(HeapResource::new("secondary"));
        let segment = RunLengthSegment::from_values(&[1, 1, 2, 2, 2]).unwrap();
        let copy = segment.copy_using_resource(&secondary).unwrap();
        assert_eq!(copy.kind(), SegmentKind::RunLength);
        assert_eq!(copy.to_vec(), segment.to_vec());
        assert!(!copy.is_resident());
    }
}
