use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::common::{Result, SegmentId};
use crate::memory::{align_up, os_page_size, MemoryResource, MmapResource};
use crate::storage::{Segment, SegmentRef};
use crate::tier::{TierManager, TierMaps};

/// A tier backed by a file whose written pages are served by demand paging.
///
/// Every segment is written into its own page-aligned range of the mapping:
/// ```text
/// ┌──────────────┬────┬──────────────┬────┬────────────────────────
/// │ segment A    │pad │ segment B    │pad │        (unused)
/// └──────────────┴────┴──────────────┴────┴────────────────────────
/// ^ page            ^ page            ^ page
/// ```
/// Once a range is written it is flushed to the file and its resident pages
/// are handed back to the OS, so the copy costs no primary memory until it
/// is read again.
pub struct PagedTierManager {
    mmap: Arc<MmapResource>,
    resource: Arc<dyn MemoryResource>,
    page_size: usize,
    maps: Mutex<TierMaps>,
    released_bytes: AtomicUsize,
    delete_file_on_drop: AtomicBool,
}

impl PagedTierManager {
    /// Create a tier over a new file at `path`.
    ///
    /// `file_size` is rounded up to a whole number of pages.
    pub fn create<P: AsRef<Path>>(path: P, file_size: usize) -> Result<Self> {
        let page_size = os_page_size();
        let mmap = Arc::new(MmapResource::create(path, align_up(file_size, page_size))?);
        Ok(Self::with_page_size(mmap, page_size))
    }

    /// Create a tier over an existing mapping.
    pub fn with_page_size(mmap: Arc<MmapResource>, page_size: usize) -> Self {
        let resource: Arc<dyn MemoryResource> = mmap.clone();
        Self {
            mmap,
            resource,
            page_size,
            maps: Mutex::new(TierMaps::new()),
            released_bytes: AtomicUsize::new(0),
            delete_file_on_drop: AtomicBool::new(true),
        }
    }

    /// The backing mapping.
    pub fn mmap(&self) -> &Arc<MmapResource> {
        &self.mmap
    }

    /// Page size ranges are aligned to.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Bytes handed back to the OS so far.
    pub fn released_bytes(&self) -> usize {
        self.released_bytes.load(Ordering::Relaxed)
    }

    /// Whether the backing file is deleted when the tier is dropped.
    pub fn set_delete_file_on_drop(&self, delete: bool) {
        self.delete_file_on_drop.store(delete, Ordering::Relaxed);
    }
}

impl TierManager for PagedTierManager {
    fn name(&self) -> &str {
        "demand_paged"
    }

    fn store(&self, id: SegmentId, segment: &dyn Segment) -> Result<SegmentRef> {
        let mut maps = self.maps.lock();
        maps.assert_absent(&id);

        // Start on a fresh page so the range can be released on its own
        let start = align_up(self.mmap.high_water_mark(), self.page_size);
        self.mmap.advance_high_water_mark(start)?;

        let copy = segment.copy_using_resource(&self.resource)?;

        let end = align_up(self.mmap.high_water_mark(), self.page_size);
        self.mmap.advance_high_water_mark(end)?;

        self.mmap.sync_range(start, end - start)?;
        self.mmap.release_range(start, end - start)?;
        self.released_bytes.fetch_add(end - start, Ordering::Relaxed);

        debug!(
            segment = %id,
            offset = start,
            bytes = end - start,
            "stored segment in paged file"
        );
        maps.insert(id, copy.clone());
        Ok(copy)
    }

    fn maps(&self) -> &Mutex<TierMaps> {
        &self.maps
    }
}

impl Drop for PagedTierManager {
    fn drop(&mut self) {
        self.maps.lock().clear();
        if self.delete_file_on_drop.load(Ordering::Relaxed) {
            if let Err(e) = self.mmap.close_and_delete() {
                warn!(path = %self.mmap.path().display(), error = %e, "failed to delete paged file");
            }
        }
    }
}

impl std::fmt::Debug for PagedTierManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedTierManager")
            .field("path", &self.mmap.path())
            .field("page_size", &self.page_size)
            .field("high_water_mark", &self.mmap.high_water_mark())
            .finish()
    }
}
