//! Swap coordinator - applies a resident set to the storage directory.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::common::{Error, Result, SegmentId};
use crate::memory::{HeapResource, MemoryResource};
use crate::storage::{Chunk, MemoryUsageMode, Segment, SegmentRef, StorageDirectory};
use crate::tier::TierManager;

/// Outcome of one [`SwapCoordinator::swap`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapReport {
    /// Segments copied into the tier for the first time.
    pub persisted: usize,
    /// Segments replaced by their tier copy.
    pub evicted: usize,
    /// Segments copied back to primary memory.
    pub restored: usize,
    pub bytes_evicted: usize,
    pub bytes_restored: usize,
    /// Transitions that failed and were skipped.
    pub failed: usize,
}

impl SwapReport {
    /// Number of segments whose residency changed.
    pub fn transitions(&self) -> usize {
        self.evicted + self.restored
    }

    /// Whether the pass left every segment where it was.
    pub fn is_noop(&self) -> bool {
        self.transitions() == 0 && self.persisted == 0 && self.failed == 0
    }
}

/// Moves segments between primary memory and a tier.
///
/// For every eligible segment:
/// ```text
///             in resident set             not in resident set
/// evicted     copy to primary, replace    -
/// resident    -                           copy to tier (once), replace
/// ```
///
/// Tier copies are kept after a restore, so evicting the same segment again
/// reuses the copy instead of writing it a second time.
///
/// # Ownership tracking
/// The coordinator remembers the segment it last installed in each slot. A
/// slot holding anything else was replaced by the engine (a table was
/// re-added under the same name, say): its evicted state and tier copy
/// belong to the old data and are dropped before the pass decides what to
/// do with the new segment. Ids a pass no longer sees are dropped the same
/// way.
///
/// # Failure handling
/// A transition that fails with a non-fatal error (tier full, missing
/// column) is logged and skipped; the segment keeps its current residency.
/// Fatal errors ([`Error::is_fatal`]) abort the pass.
pub struct SwapCoordinator {
    tier: Arc<dyn TierManager>,
    primary: Arc<dyn MemoryResource>,
    evicted: HashSet<SegmentId>,
    persisted: HashMap<SegmentId, SegmentRef>,
    /// Segment each slot was last set to by this coordinator.
    installed: HashMap<SegmentId, SegmentRef>,
    max_segment_footprint: usize,
    include_mutable_chunks: bool,
}

impl SwapCoordinator {
    /// Create a coordinator over `tier`, restoring onto the primary heap.
    pub fn new(tier: Arc<dyn TierManager>, max_segment_footprint: usize) -> Self {
        Self {
            tier,
            primary: HeapResource::shared(),
            evicted: HashSet::new(),
            persisted: HashMap::new(),
            installed: HashMap::new(),
            max_segment_footprint,
            include_mutable_chunks: false,
        }
    }

    /// Restore onto `primary` instead of the shared heap.
    pub fn with_primary(mut self, primary: Arc<dyn MemoryResource>) -> Self {
        self.primary = primary;
        self
    }

    /// Whether chunks that still accept appends take part.
    pub fn include_mutable_chunks(mut self, include: bool) -> Self {
        self.include_mutable_chunks = include;
        self
    }

    /// The tier evicted copies live in.
    pub fn tier(&self) -> &Arc<dyn TierManager> {
        &self.tier
    }

    /// Whether `id` currently lives in the tier.
    pub fn is_evicted(&self, id: &SegmentId) -> bool {
        self.evicted.contains(id)
    }

    /// Number of evicted segments.
    pub fn evicted_len(&self) -> usize {
        self.evicted.len()
    }

    /// Number of segments with a tier copy.
    pub fn persisted_len(&self) -> usize {
        self.persisted.len()
    }

    /// Evicted segment ids in order.
    pub fn evicted_ids(&self) -> Vec<SegmentId> {
        let mut ids: Vec<SegmentId> = self.evicted.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Make the directory match `resident`: segments in the set end up in
    /// primary memory, all other eligible segments in the tier.
    ///
    /// Running the same pass twice without access changes performs no
    /// transitions the second time.
    pub fn swap(
        &mut self,
        directory: &StorageDirectory,
        resident: &HashSet<SegmentId>,
    ) -> Result<SwapReport> {
        let mut report = SwapReport::default();
        let mut visited = HashSet::new();

        directory.try_for_each_segment(self.include_mutable_chunks, |id, chunk, segment| {
            if self.is_replaced(&id, &segment) {
                debug!(segment = %id, "segment replaced since last pass, tracking it as new");
                self.forget(&id);
            }
            visited.insert(id.clone());

            let result = if resident.contains(&id) {
                self.restore(&id, chunk, &segment, &mut report)
            } else {
                self.evict(&id, chunk, &segment, &mut report)
            };

            match result {
                Ok(()) => Ok(()),
                Err(err) if err.is_fatal() => Err(err),
                Err(err) => {
                    report.failed += 1;
                    error!(segment = %id, error = %err, "segment swap failed, skipping");
                    Ok(())
                }
            }
        })?;

        let vanished: Vec<SegmentId> = self
            .installed
            .keys()
            .filter(|id| !visited.contains(*id))
            .cloned()
            .collect();
        if !vanished.is_empty() {
            debug!(count = vanished.len(), "dropping state of vanished segments");
            for id in &vanished {
                self.forget(id);
            }
        }

        info!(
            evicted = report.evicted,
            restored = report.restored,
            persisted = report.persisted,
            failed = report.failed,
            "swap pass complete"
        );
        Ok(report)
    }

    fn restore(
        &mut self,
        id: &SegmentId,
        chunk: &Arc<Chunk>,
        segment: &SegmentRef,
        report: &mut SwapReport,
    ) -> Result<()> {
        if !self.evicted.contains(id) {
            return Ok(());
        }

        self.check_footprint(id, segment.as_ref())?;
        let copy = segment.copy_using_resource(&self.primary)?;
        Self::install(id, chunk, Arc::clone(&copy))?;

        self.evicted.remove(id);
        self.installed.insert(id.clone(), copy);
        self.tier.remove(id);

        let bytes = segment.memory_usage(MemoryUsageMode::Full);
        report.restored += 1;
        report.bytes_restored += bytes;
        info!(segment = %id, bytes, "moved segment to memory");
        Ok(())
    }

    fn evict(
        &mut self,
        id: &SegmentId,
        chunk: &Arc<Chunk>,
        segment: &SegmentRef,
        report: &mut SwapReport,
    ) -> Result<()> {
        if self.evicted.contains(id) {
            return Ok(());
        }

        self.check_footprint(id, segment.as_ref())?;
        let copy = match self.tier.load(id) {
            Some(copy) if self.persisted.contains_key(id) => {
                // Carry the counts accumulated while the segment was resident
                copy.access_counter().set(segment.access_counter().snapshot());
                debug!(segment = %id, "reusing persisted copy");
                copy
            }
            loaded => {
                let copy = match loaded {
                    Some(copy) => copy,
                    None => {
                        if self.persisted.remove(id).is_some() {
                            warn!(
                                segment = %id,
                                tier = self.tier.name(),
                                "tier lost persisted copy, storing it again"
                            );
                        }
                        self.tier.store(id.clone(), segment.as_ref())?
                    }
                };
                self.persisted.insert(id.clone(), Arc::clone(&copy));
                report.persisted += 1;
                info!(segment = %id, tier = self.tier.name(), "persisted segment");
                copy
            }
        };

        if let Err(err) = Self::install(id, chunk, Arc::clone(&copy)) {
            self.tier.remove(id);
            return Err(err);
        }
        self.installed.insert(id.clone(), copy);
        self.evicted.insert(id.clone());

        let bytes = segment.memory_usage(MemoryUsageMode::Full);
        report.evicted += 1;
        report.bytes_evicted += bytes;
        info!(segment = %id, bytes, "evicted segment");
        Ok(())
    }

    fn install(id: &SegmentId, chunk: &Chunk, segment: SegmentRef) -> Result<()> {
        chunk
            .replace_segment(id.column_id, segment)
            .map(|_| ())
            .ok_or_else(|| Error::ColumnNotFound {
                table: id.table_name.clone(),
                chunk: id.chunk_id.0,
                column: id.column_id.0,
            })
    }

    /// Whether the slot holds something other than what this coordinator
    /// put there.
    fn is_replaced(&self, id: &SegmentId, segment: &SegmentRef) -> bool {
        self.installed
            .get(id)
            .is_some_and(|installed| !Arc::ptr_eq(installed, segment))
    }

    /// Drop all state kept for `id`, including its tier copy.
    fn forget(&mut self, id: &SegmentId) {
        self.evicted.remove(id);
        self.persisted.remove(id);
        self.installed.remove(id);
        self.tier.purge(id);
    }

    /// A relocated copy has the same footprint as its source.
    fn check_footprint(&self, id: &SegmentId, segment: &dyn Segment) -> Result<()> {
        let footprint = segment.memory_usage(MemoryUsageMode::Full);
        if footprint > self.max_segment_footprint {
            return Err(Error::FootprintExceeded {
                segment: id.clone(),
                footprint,
                ceiling: self.max_segment_footprint,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for SwapCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapCoordinator")
            .field("tier", &self.tier.name())
            .field("evicted", &self.evicted.len())
            .field("persisted", &self.persisted.len())
            .finish()
    }
}
