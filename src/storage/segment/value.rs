use std::sync::Arc;

use crate::common::Result;
use crate::memory::{HeapResource, MemoryResource, TypedBuffer};
use crate::storage::segment::{MemoryUsageMode, Segment, SegmentKind, SegmentRef};
use crate::storage::SegmentAccessCounter;

/// An unencoded segment: one `i32` per row.
#[derive(Debug)]
pub struct ValueSegment {
    values: TypedBuffer<i32>,
    access_counter: SegmentAccessCounter,
}

impl ValueSegment {
    /// Create a segment on the primary heap.
    pub fn new(values: &[i32]) -> Result<Self> {
        Self::with_resource(values, &HeapResource::shared())
    }

    /// Create a segment whose buffer lives on `resource`.
    pub fn with_resource(values: &[i32], resource: &Arc<dyn MemoryResource>) -> Result<Self> {
        Ok(Self {
            values: TypedBuffer::from_slice(resource, values)?,
            access_counter: SegmentAccessCounter::new(),
        })
    }

    /// The row values.
    pub fn values(&self) -> &[i32] {
        self.values.as_slice()
    }

    /// Mutable row values. Only reachable before the segment is shared.
    pub fn values_mut(&mut self) -> &mut [i32] {
        self.values.as_mut_slice()
    }
}

impl Segment for ValueSegment {
    fn size(&self) -> usize {
        self.values.len()
    }

    fn memory_usage(&self, mode: MemoryUsageMode) -> usize {
        match mode {
            MemoryUsageMode::Sampled => self.values.byte_len(),
            MemoryUsageMode::Full => std::mem::size_of::<Self>() + self.values.byte_len(),
        }
    }

    fn access_counter(&self) -> &SegmentAccessCounter {
        &self.access_counter
    }

    fn kind(&self) -> SegmentKind {
        SegmentKind::Unencoded
    }

    fn is_resident(&self) -> bool {
        self.values.resource().is_primary()
    }

    fn value_at(&self, offset: usize) -> Option<i32> {
        self.values.as_slice().get(offset).copied()
    }

    fn copy_using_resource(&self, resource: &Arc<dyn MemoryResource>) -> Result<SegmentRef> {
        Ok(Arc::new(Self {
            values: TypedBuffer::from_slice(resource, self.values.as_slice())?,
            access_counter: SegmentAccessCounter::from_counts(self.access_counter.snapshot()),
        }))
    }
}
