use std::sync::Arc;

use crate::common::Result;
use crate::memory::{HeapResource, MemoryResource, TypedBuffer};
use crate::storage::segment::{MemoryUsageMode, Segment, SegmentKind, SegmentRef};
use crate::storage::{AccessCategory, SegmentAccessCounter};

/// A dictionary-encoded segment.
///
/// The dictionary holds the distinct values in ascending order; the
/// attribute vector holds one dictionary code per row.
#[derive(Debug)]
pub struct DictionarySegment {
    dictionary: TypedBuffer<i32>,
    attribute_vector: TypedBuffer<u32>,
    access_counter: SegmentAccessCounter,
}

impl DictionarySegment {
    /// Encode `values` on the primary heap.
    pub fn from_values(values: &[i32]) -> Result<Self> {
        Self::with_resource(values, &HeapResource::shared())
    }

    /// Encode `values` with both buffers on `resource`.
    pub fn with_resource(values: &[i32], resource: &Arc<dyn MemoryResource>) -> Result<Self> {
        let mut dictionary = values.to_vec();
        dictionary.sort_unstable();
        dictionary.dedup();

        let codes: Vec<u32> = values
            .iter()
            .map(|v| dictionary.partition_point(|d| d < v) as u32)
            .collect();

        Ok(Self {
            dictionary: TypedBuffer::from_slice(resource, &dictionary)?,
            attribute_vector: TypedBuffer::from_slice(resource, &codes)?,
            access_counter: SegmentAccessCounter::new(),
        })
    }

    /// Distinct values in ascending order.
    pub fn dictionary(&self) -> &[i32] {
        self.dictionary.as_slice()
    }

    /// One code per row.
    pub fn attribute_vector(&self) -> &[u32] {
        self.attribute_vector.as_slice()
    }

    /// Code of `value`, if it occurs in the segment.
    ///
    /// Recorded as a dictionary access.
    pub fn lookup(&self, value: i32) -> Option<u32> {
        self.access_counter.record(AccessCategory::Dictionary, 1);
        self.dictionary
            .as_slice()
            .binary_search(&value)
            .ok()
            .map(|code| code as u32)
    }
}

impl Segment for DictionarySegment {
    fn size(&self) -> usize {
        self.attribute_vector.len()
    }

    fn memory_usage(&self, mode: MemoryUsageMode) -> usize {
        let data = self.dictionary.byte_len() + self.attribute_vector.byte_len();
        match mode {
            MemoryUsageMode::Sampled => data,
            MemoryUsageMode::Full => std::mem::size_of::<Self>() + data,
        }
    }

    fn access_counter(&self) -> &SegmentAccessCounter {
        &self.access_counter
    }

    fn kind(&self) -> SegmentKind {
        SegmentKind::Dictionary
    }

    fn is_resident(&self) -> bool {
        self.dictionary.resource().is_primary() && self.attribute_vector.resource().is_primary()
    }

    fn value_at(&self, offset: usize) -> Option<i32> {
        let code = *self.attribute_vector.as_slice().get(offset)?;
        self.dictionary.as_slice().get(code as usize).copied()
    }

    fn copy_using_resource(&self, resource: &Arc<dyn MemoryResource>) -> Result<SegmentRef> {
        Ok(Arc::new(Self {
            dictionary: TypedBuffer::from_slice(resource, self.dictionary.as_slice())?,
            attribute_vector: TypedBuffer::from_slice(resource, self.attribute_vector.as_slice())?,
            access_counter: SegmentAccessCounter::from_counts(self.access_counter.snapshot()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding() {
        let segment = DictionarySegment::from_values(&[30, 10, 30, 20, 10]).unwrap();
        assert_eq!(segment.dictionary(), &[10, 20, 30]);
        assert_eq!(segment.attribute_vector(), &[2, 0, 2, 1, 0]);
        assert_eq!(segment.to_vec(), vec![30, 10, 30, 20, 10]);
        assert_eq!(segment.memory_usage(MemoryUsageMode::Sampled), 3 * 4 + 5 * 4);
    }

    #[test]
    fn test_lookup_counts_dictionary_access() {
        let segment = DictionarySegment::from_values(&[5, 6, 7]).unwrap();
        assert_eq!(segment.lookup(6), Some(1));
        assert_eq!(segment.lookup(8), None);
        assert_eq!(segment.access_counter().snapshot().dictionary, 2);
    }

    #[test]
    fn test_copy_moves_both_buffers() {
        let secondary: Arc<dyn MemoryResource> = Arc::new(HeapResource::new("secondary"));
        let segment = DictionarySegment::from_values(&[1, 1, 2]).unwrap();

        let copy = segment.copy_using_resource(&secondary).unwrap();
        assert!(!copy.is_resident());
        assert_eq!(copy.kind(), SegmentKind::Dictionary);
        assert_eq!(copy.to_vec(), vec![1, 1, 2]);
        assert_eq!(secondary.allocated_bytes(), 2 * 4 + 3 * 4);
    }
}
