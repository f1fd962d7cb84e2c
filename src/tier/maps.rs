use std::collections::HashMap;

use crate::common::SegmentId;
use crate::storage::SegmentRef;

/// Bookkeeping shared by every tier manager.
///
/// - `cached`: every copy the tier holds, keyed by segment
/// - `active`: the subset currently serving as the live segment
///
/// `active ⊆ cached` always holds. Removing a segment only drops it from
/// `active`; its copy stays in `cached` for a later eviction.
#[derive(Debug, Default)]
pub struct TierMaps {
    active: HashMap<SegmentId, SegmentRef>,
    cached: HashMap<SegmentId, SegmentRef>,
}

impl TierMaps {
    /// Create empty maps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Panic if `id` is already tracked.
    ///
    /// # Panics
    /// Storing the same segment twice is a caller bug.
    pub fn assert_absent(&self, id: &SegmentId) {
        assert!(
            !self.active.contains_key(id),
            "segment {} already exists as active segment",
            id
        );
        assert!(
            !self.cached.contains_key(id),
            "segment {} already exists as cached segment",
            id
        );
    }

    /// Track a freshly stored copy as active.
    pub fn insert(&mut self, id: SegmentId, segment: SegmentRef) {
        self.assert_absent(&id);
        self.cached.insert(id.clone(), segment.clone());
        self.active.insert(id, segment);
    }

    /// The tier's copy of `id`, promoting a cached copy to active.
    pub fn load(&mut self, id: &SegmentId) -> Option<SegmentRef> {
        if let Some(segment) = self.active.get(id) {
            return Some(segment.clone());
        }
        let segment = self.cached.get(id)?.clone();
        self.active.insert(id.clone(), segment.clone());
        Some(segment)
    }

    /// Stop serving `id` from the tier. Returns whether it was active.
    ///
    /// The copy's storage stays allocated, which is what lets the segment be
    /// evicted again later without another copy.
    pub fn remove(&mut self, id: &SegmentId) -> bool {
        self.active.remove(id).is_some()
    }

    /// Number of active copies.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Number of copies held, active or not.
    pub fn cached_len(&self) -> usize {
        self.cached.len()
    }

    /// Whether `id` is active.
    pub fn is_active(&self, id: &SegmentId) -> bool {
        self.active.contains_key(id)
    }

    /// Forget `id` entirely, active and cached. Returns the dropped copy.
    ///
    /// Unlike [`remove`](Self::remove), a later `insert` of the same id is
    /// allowed again.
    pub fn purge(&mut self, id: &SegmentId) -> Option<SegmentRef> {
        self.active.remove(id);
        self.cached.remove(id)
    }

    /// Drop every tracked copy.
    pub fn clear(&mut self) {
        self.active.clear();
        self.cached.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::common::{ChunkId, ColumnId};
    use crate::storage::ValueSegment;

    fn id(chunk: u32) -> SegmentId {
        SegmentId::new("t", ChunkId(chunk), ColumnId(0), "c")
    }

    fn segment() -> SegmentRef {
        Arc::new(ValueSegment::new(&[1, 2, 3]).unwrap())
    }

    #[test]
    fn test_load_missing() {
        let mut maps = TierMaps::new();
        assert!(maps.load(&id(0)).is_none());
        assert!(!maps.remove(&id(0)));
    }

    #[test]
    fn test_remove_then_load_promotes() {
        let mut maps = TierMaps::new();
        let copy = segment();
        maps.insert(id(0), copy.clone());
        assert!(maps.is_active(&id(0)));

        assert_eq!((maps.active_len(), maps.cached_len()), (1, 1));

        assert!(maps.remove(&id(0)));
        assert_eq!((maps.active_len(), maps.cached_len()), (0, 1));
        assert!(!maps.remove(&id(0)));

        let loaded = maps.load(&id(0)).unwrap();
        assert!(Arc::ptr_eq(&loaded, &copy));
        assert_eq!((maps.active_len(), maps.cached_len()), (1, 1));
    }

    #[test]
    fn test_purge_allows_store_again() {
        let mut maps = TierMaps::new();
        let copy = segment();
        maps.insert(id(0), copy.clone());
        maps.remove(&id(0));

        let purged = maps.purge(&id(0)).unwrap();
        assert!(Arc::ptr_eq(&purged, &copy));
        assert_eq!((maps.active_len(), maps.cached_len()), (0, 0));
        assert!(maps.load(&id(0)).is_none());
        assert!(maps.purge(&id(0)).is_none());

        maps.insert(id(0), segment());
        assert!(maps.is_active(&id(0)));
    }

    #[test]
    #[should_panic(expected = "already exists as active segment")]
    fn test_duplicate_active_panics() {
        let mut maps = TierMaps::new();
        maps.insert(id(0), segment());
        maps.insert(id(0), segment());
    }

    #[test]
    #[should_panic(expected = "already exists as cached segment")]
    fn test_duplicate_cached_panics() {
        let mut maps = TierMaps::new();
        maps.insert(id(0), segment());
        maps.remove(&id(0));
        maps.insert(id(0), segment());
    }
}
