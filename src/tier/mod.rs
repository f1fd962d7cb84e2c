//! Tier managers - where evicted segments are kept.
//!
//! A tier manager stores deep copies of segments on a secondary memory
//! resource and remembers them by [`SegmentId`]:
//!
//! ```text
//!            store                      remove
//!   (none) ────────► active + cached ──────────► cached only
//!                          ▲                          │
//!                          └──────── load ────────────┘
//! ```
//!
//! `remove` never frees the copy; it stays cached so a later eviction of the
//! same segment can reuse it. `purge` forgets the id in both maps, for
//! segments whose source no longer exists.

mod maps;
mod paged;
mod resource;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::common::{AntiCachingConfig, Error, MemoryResourceType, Result, SegmentId};
use crate::memory::{align_up, os_page_size, MemoryResourceRegistry};
use crate::storage::{Segment, SegmentRef};

pub use maps::TierMaps;
pub use paged::PagedTierManager;
pub use resource::ResourceTierManager;

/// Storage for evicted segment copies.
///
/// # Thread Safety
/// All methods take `&self`; implementations keep their [`TierMaps`] behind
/// a `Mutex`.
pub trait TierManager: Send + Sync + std::fmt::Debug {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Deep-copy `segment` into the tier and track the copy as active.
    ///
    /// # Errors
    /// Whatever the backing resource reports, typically `Error::OutOfSpace`.
    ///
    /// # Panics
    /// Panics if `id` is already tracked (active or cached).
    fn store(&self, id: SegmentId, segment: &dyn Segment) -> Result<SegmentRef>;

    /// The tier's bookkeeping.
    fn maps(&self) -> &Mutex<TierMaps>;

    /// The tier's copy of `id`; a cached copy is promoted back to active.
    fn load(&self, id: &SegmentId) -> Option<SegmentRef> {
        self.maps().lock().load(id)
    }

    /// Stop serving `id` from the tier, keeping its cached copy. Returns
    /// whether it was active.
    fn remove(&self, id: &SegmentId) -> bool {
        self.maps().lock().remove(id)
    }

    /// Forget `id` and drop its copy, active or cached. Returns whether a
    /// copy was held.
    fn purge(&self, id: &SegmentId) -> bool {
        self.maps().lock().purge(id).is_some()
    }

    /// Number of active copies.
    fn active_len(&self) -> usize {
        self.maps().lock().active_len()
    }

    /// Number of copies held, active or not.
    fn cached_len(&self) -> usize {
        self.maps().lock().cached_len()
    }
}

/// Build the tier selected by `config.memory_resource_type`.
///
/// Backing resources are created through `registry`, which owns them.
pub fn create_tier_manager(
    config: &AntiCachingConfig,
    registry: &MemoryResourceRegistry,
) -> Result<Arc<dyn TierManager>> {
    let pool_size = usize::try_from(config.pool_size).map_err(|_| {
        Error::InvalidConfig(format!("pool_size {} does not fit in memory", config.pool_size))
    })?;

    let tier: Arc<dyn TierManager> = match config.memory_resource_type {
        MemoryResourceType::AddressSpace => {
            let heap = registry.create_heap("address_space");
            let arena = registry.create_monotonic(heap)?;
            Arc::new(ResourceTierManager::new("address_space", registry.get(arena)?))
        }
        MemoryResourceType::Mmap => {
            let (_, mmap) = registry.create_mmap(pool_size)?;
            Arc::new(ResourceTierManager::new("mmap", mmap))
        }
        MemoryResourceType::DemandPaged => {
            let page_size = os_page_size();
            let (_, mmap) = registry.create_mmap(align_up(pool_size, page_size))?;
            Arc::new(PagedTierManager::with_page_size(mmap, page_size))
        }
        MemoryResourceType::PersistentPool => {
            let (_, pool) = registry.create_pool(pool_size)?;
            Arc::new(ResourceTierManager::new("pmem", pool))
        }
    };

    info!(
        tier = tier.name(),
        resource_type = %config.memory_resource_type,
        pool_size,
        "created tier manager"
    );
    Ok(tier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ChunkId, ColumnId};
    use crate::storage::ValueSegment;
    use tempfile::tempdir;

    fn config(resource_type: MemoryResourceType, dir: &std::path::Path) -> AntiCachingConfig {
        AntiCachingConfig {
            memory_resource_type: resource_type,
            pool_size: 64 * 1024,
            pool_directory: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_factory_builds_each_tier() {
        let dir = tempdir().unwrap();
        let registry = MemoryResourceRegistry::new(dir.path());

        let cases = [
            (MemoryResourceType::AddressSpace, "address_space"),
            (MemoryResourceType::Mmap, "mmap"),
            (MemoryResourceType::DemandPaged, "demand_paged"),
            (MemoryResourceType::PersistentPool, "pmem"),
        ];
        for (resource_type, name) in cases {
            let tier = create_tier_manager(&config(resource_type, dir.path()), &registry).unwrap();
            assert_eq!(tier.name(), name);
        }
    }

    #[test]
    fn test_store_keeps_copy_out_of_primary_memory() {
        let dir = tempdir().unwrap();
        let registry = MemoryResourceRegistry::new(dir.path());
        let tier =
            create_tier_manager(&config(MemoryResourceType::Mmap, dir.path()), &registry).unwrap();

        let id = SegmentId::new("t", ChunkId(0), ColumnId(0), "c");
        let segment = ValueSegment::new(&[1, 2, 3]).unwrap();

        let copy = tier.store(id.clone(), &segment).unwrap();
        assert!(!copy.is_resident());
        assert_eq!(copy.to_vec(), vec![1, 2, 3]);
        assert_eq!(tier.active_len(), 1);
    }
}
