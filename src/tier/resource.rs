use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::common::{Result, SegmentId};
use crate::memory::MemoryResource;
use crate::storage::{MemoryUsageMode, Segment, SegmentRef};
use crate::tier::{TierManager, TierMaps};

/// A tier that deep-copies segments onto a memory resource.
///
/// Covers the address-space tier (a heap or arena resource), the mmap tier
/// and the persistent pool tier: they differ only in the resource handed in.
/// After every store the resource is asked to persist, which flushes file
/// backed resources and is a no-op on the heap.
pub struct ResourceTierManager {
    name: String,
    resource: Arc<dyn MemoryResource>,
    maps: Mutex<TierMaps>,
}

impl ResourceTierManager {
    /// Create a tier called `name` storing copies on `resource`.
    pub fn new(name: impl Into<String>, resource: Arc<dyn MemoryResource>) -> Self {
        Self {
            name: name.into(),
            resource,
            maps: Mutex::new(TierMaps::new()),
        }
    }

    /// The resource copies are stored on.
    pub fn resource(&self) -> &Arc<dyn MemoryResource> {
        &self.resource
    }
}

impl TierManager for ResourceTierManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn store(&self, id: SegmentId, segment: &dyn Segment) -> Result<SegmentRef> {
        let mut maps = self.maps.lock();
        maps.assert_absent(&id);

        let copy = segment.copy_using_resource(&self.resource)?;
        self.resource.persist()?;

        debug!(
            tier = %self.name,
            segment = %id,
            bytes = copy.memory_usage(MemoryUsageMode::Sampled),
            "stored segment"
        );
        maps.insert(id, copy.clone());
        Ok(copy)
    }

    fn maps(&self) -> &Mutex<TierMaps> {
        &self.maps
    }
}

impl std::fmt::Debug for ResourceTierManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTierManager")
            .field("name", &self.name)
            .field("resource", &self.resource.name())
            .finish()
    }
}
