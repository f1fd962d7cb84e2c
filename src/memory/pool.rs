//! Persistent object pool inside a memory-mapped file.
//!
//! Unlike [`MmapResource`](super::MmapResource), the pool supports real
//! deallocation: freed blocks go back to a free list and are coalesced with
//! their neighbours. Every block carries a small checksummed header so a
//! damaged pool is detected instead of handing out garbage.

use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use memmap2::{MmapMut, MmapOptions};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::common::{Error, Result};
use crate::memory::{align_up, MemoryResource};

/// Size of the pool header at offset 0.
pub const POOL_HEADER_SIZE: usize = 64;

/// Size of the header preceding every block payload.
pub const BLOCK_HEADER_SIZE: usize = 32;

const POOL_MAGIC: &[u8; 8] = b"ACPOOL01";
const BLOCK_MAGIC: u32 = 0xB10C_A7ED;
const BLOCK_ALLOCATED: u32 = 1;
const BLOCK_FREE: u32 = 0;

/// Granularity of block boundaries.
const BLOCK_ALIGN: usize = 8;

/// A file-backed pool with a first-fit free list.
///
/// # Layout
/// ```text
/// ┌──────────────┬─────┬────────┬─────────┬─────┬────────┬─────────┬─ ─ ─
/// │ Pool header  │ pad │ header │ payload │ pad │ header │ payload │
/// │ (64 bytes)   │     │ (32B)  │         │     │ (32B)  │         │
/// └──────────────┴─────┴────────┴─────────┴─────┴────────┴─────────┴─ ─ ─
/// ```
///
/// Pool header: magic (8) | pool size u64 LE (8) | crc32 of both (4).
///
/// Block header: magic u32 | state u32 | block start u64 | payload length
/// u64 | crc32 of the previous 24 bytes.
///
/// # Thread Safety
/// Free list and allocation table live behind one `Mutex`.
pub struct PoolResource {
    path: PathBuf,
    pool_size: usize,
    map: MmapMut,
    base: NonNull<u8>,
    state: Mutex<PoolState>,
}

// SAFETY: `base` points into `map`; headers are only written under the
// state lock and payloads are disjoint ranges owned by their allocations.
unsafe impl Send for PoolResource {}
unsafe impl Sync for PoolResource {}

#[derive(Debug, Default)]
struct PoolState {
    /// Free ranges, keyed by start offset.
    free: BTreeMap<usize, usize>,
    /// Payload offset -> (block start, block length).
    blocks: HashMap<usize, (usize, usize)>,
    /// Sum of block lengths currently allocated.
    allocated: usize,
}

impl PoolState {
    /// Insert a free range and merge it with adjacent free ranges.
    fn release(&mut self, mut start: usize, mut len: usize) {
        if let Some((&prev_start, &prev_len)) = self.free.range(..start).next_back() {
            if prev_start + prev_len == start {
                self.free.remove(&prev_start);
                start = prev_start;
                len += prev_len;
            }
        }
        if let Some(next_len) = self.free.remove(&(start + len)) {
            len += next_len;
        }
        self.free.insert(start, len);
    }

    /// Carve `[start, end)` out of the free range beginning at `start`; the
    /// tail stays free. Undo with `release(start, end - start)`.
    fn take(&mut self, start: usize, end: usize) {
        if let Some(len) = self.free.remove(&start) {
            if end < start + len {
                self.free.insert(end, start + len - end);
            }
        }
    }
}

impl PoolResource {
    /// Create a pool file of `pool_size` bytes, replacing any existing file.
    ///
    /// # Errors
    /// - `Error::Allocation` if the pool cannot hold a single block
    /// - `Error::Io` if the file cannot be created or mapped
    pub fn create<P: AsRef<Path>>(path: P, pool_size: usize) -> Result<Self> {
        if pool_size < POOL_HEADER_SIZE + BLOCK_HEADER_SIZE + BLOCK_ALIGN {
            return Err(Error::Allocation(format!(
                "pool size {} is too small for a single block",
                pool_size
            )));
        }

        let path = path.as_ref().to_path_buf();
        if path.exists() {
            warn!(path = %path.display(), "replacing existing pool file");
            std::fs::remove_file(&path)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.set_len(pool_size as u64)?;

        // SAFETY: freshly created file, never resized while mapped.
        let mut map = unsafe { MmapOptions::new().len(pool_size).map_mut(&file)? };

        let mut header = [0u8; 20];
        header[..8].copy_from_slice(POOL_MAGIC);
        header[8..16].copy_from_slice(&(pool_size as u64).to_le_bytes());
        let crc = crc32fast::hash(&header[..16]);
        header[16..20].copy_from_slice(&crc.to_le_bytes());
        map[..20].copy_from_slice(&header);
        map.flush_range(0, POOL_HEADER_SIZE)?;

        let base = NonNull::new(map.as_mut_ptr())
            .ok_or_else(|| Error::Allocation("mmap returned a null mapping".into()))?;

        let mut state = PoolState::default();
        state.free.insert(POOL_HEADER_SIZE, pool_size - POOL_HEADER_SIZE);

        debug!(path = %path.display(), pool_size, "created persistent pool");

        Ok(Self {
            path,
            pool_size,
            map,
            base,
            state: Mutex::new(state),
        })
    }

    /// Path of the pool file.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capacity of the pool in bytes, header included.
    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of live blocks.
    pub fn block_count(&self) -> usize {
        self.state.lock().blocks.len()
    }

    /// Number of disjoint free ranges.
    pub fn free_range_count(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Largest contiguous free range in bytes.
    pub fn largest_free_range(&self) -> usize {
        self.state.lock().free.values().copied().max().unwrap_or(0)
    }

    /// Verify the pool header and the header of every live block.
    ///
    /// # Errors
    /// `Error::CorruptedPool` naming the first damaged header.
    pub fn check_integrity(&self) -> Result<()> {
        self.check_pool_header()?;
        let state = self.state.lock();
        for (&payload, &(start, _)) in &state.blocks {
            self.check_block_header(payload, start, BLOCK_ALLOCATED)?;
        }
        Ok(())
    }

    fn check_pool_header(&self) -> Result<()> {
        let header = self.bytes(0, 20);
        let stored = u32::from_le_bytes([header[16], header[17], header[18], header[19]]);
        if &header[..8] != POOL_MAGIC || crc32fast::hash(&header[..16]) != stored {
            return Err(Error::CorruptedPool(format!(
                "{}: bad pool header",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn check_block_header(&self, payload: usize, start: usize, state: u32) -> Result<()> {
        let header = self.bytes(payload - BLOCK_HEADER_SIZE, BLOCK_HEADER_SIZE);
        let word = |at: usize| {
            u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]])
        };
        let stored_start = u64::from_le_bytes(header[8..16].try_into().unwrap_or([0; 8]));

        if word(0) != BLOCK_MAGIC
            || word(4) != state
            || stored_start != start as u64
            || crc32fast::hash(&header[..24]) != word(24)
        {
            return Err(Error::CorruptedPool(format!(
                "{}: bad block header at offset {}",
                self.path.display(),
                payload - BLOCK_HEADER_SIZE
            )));
        }
        Ok(())
    }

    fn write_block_header(
        &self,
        payload: usize,
        start: usize,
        len: usize,
        state: u32,
    ) -> Result<()> {
        let mut header = [0u8; BLOCK_HEADER_SIZE];
        header[0..4].copy_from_slice(&BLOCK_MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&state.to_le_bytes());
        header[8..16].copy_from_slice(&(start as u64).to_le_bytes());
        header[16..24].copy_from_slice(&(len as u64).to_le_bytes());
        let crc = crc32fast::hash(&header[..24]);
        header[24..28].copy_from_slice(&crc.to_le_bytes());

        let offset = payload - BLOCK_HEADER_SIZE;
        // SAFETY: the header lies inside the block, which is inside the
        // mapping; callers hold the state lock.
        unsafe {
            std::ptr::copy_nonoverlapping(
                header.as_ptr(),
                self.base.as_ptr().add(offset),
                BLOCK_HEADER_SIZE,
            );
        }
        self.map.flush_range(offset, BLOCK_HEADER_SIZE)?;
        Ok(())
    }

    fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        debug_assert!(offset + len <= self.pool_size);
        // SAFETY: in bounds of the mapping; header bytes are only mutated
        // under the state lock.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(offset), len) }
    }
}

impl MemoryResource for PoolResource {
    fn name(&self) -> &str {
        "pmem"
    }

    fn allocate(&self, bytes: usize, align: usize) -> Result<NonNull<u8>> {
        let mut state = self.state.lock();

        // First fit
        let fit = state.free.iter().find_map(|(&start, &len)| {
            let payload = align_up(start + BLOCK_HEADER_SIZE, align.max(BLOCK_ALIGN));
            let end = align_up(payload.checked_add(bytes)?, BLOCK_ALIGN);
            (end <= start + len).then_some((start, payload, end))
        });

        let Some((start, payload, end)) = fit else {
            return Err(Error::OutOfSpace {
                resource: self.path.display().to_string(),
                requested: bytes,
                available: state.free.values().copied().max().unwrap_or(0),
            });
        };

        state.take(start, end);
        if let Err(e) = self.write_block_header(payload, start, bytes, BLOCK_ALLOCATED) {
            state.release(start, end - start);
            return Err(e);
        }

        state.blocks.insert(payload, (start, end - start));
        state.allocated += end - start;

        // SAFETY: payload < pool_size, inside the mapping.
        let ptr = unsafe { self.base.as_ptr().add(payload) };
        NonNull::new(ptr).ok_or_else(|| Error::Allocation("null mapping pointer".into()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _bytes: usize, _align: usize) {
        let payload = ptr.as_ptr() as usize - self.base.as_ptr() as usize;
        let mut state = self.state.lock();

        let Some((start, len)) = state.blocks.remove(&payload) else {
            warn!(offset = payload, "deallocate of unknown pool block");
            return;
        };

        if let Err(e) = self.write_block_header(payload, start, 0, BLOCK_FREE) {
            warn!(offset = payload, error = %e, "failed to mark pool block free");
        }
        state.allocated -= len;
        state.release(start, len);
    }

    fn allocated_bytes(&self) -> usize {
        self.state.lock().allocated
    }

    fn persist(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for PoolResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolResource")
            .field("path", &self.path)
            .field("pool_size", &self.pool_size)
            .field("allocated", &self.allocated_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::memory::Allocation;
    use tempfile::tempdir;

    fn pool(size: usize) -> (tempfile::TempDir, Arc<PoolResource>) {
        let dir = tempdir().unwrap();
        let pool = PoolResource::create(dir.path().join("pmem_pool0"), size).unwrap();
        (dir, Arc::new(pool))
    }

    #[test]
    fn test_failed_allocation_rolls_back_free_list() {
        let mut state = PoolState::default();
        state.free.insert(64, 1000);

        state.take(64, 200);
        assert_eq!(state.free.get(&200), Some(&864));

        // Header write failed: give back only the carved block
        state.release(64, 200 - 64);
        assert_eq!(state.free.len(), 1);
        assert_eq!(state.free.get(&64), Some(&1000));
    }

    #[test]
    fn test_take_whole_range() {
        let mut state = PoolState::default();
        state.free.insert(64, 136);
        state.take(64, 200);
        assert!(state.free.is_empty());
        state.release(64, 136);
        assert_eq!(state.free.get(&64), Some(&136));
    }

    #[test]
    fn test_create_writes_valid_header() {
        let (dir, pool) = pool(4096);
        pool.check_integrity().unwrap();

        let bytes = std::fs::read(dir.path().join("pmem_pool0")).unwrap();
        assert_eq!(&bytes[..8], POOL_MAGIC);
        assert_eq!(bytes.len(), 4096);
    }

    #[test]
    fn test_create_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pmem_pool1");
        std::fs::write(&path, b"stale").unwrap();

        let pool = PoolResource::create(&path, 4096).unwrap();
        pool.check_integrity().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
    }

    #[test]
    fn test_too_small() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            PoolResource::create(dir.path().join("tiny"), 32),
            Err(Error::Allocation(_))
        ));
    }

    #[test]
    fn test_allocate_and_free_coalesces() {
        let (_dir, pool) = pool(4096);
        let resource: Arc<dyn MemoryResource> = pool.clone();

        let a = Allocation::new(&resource, 100, 8).unwrap();
        let b = Allocation::new(&resource, 200, 8).unwrap();
        let c = Allocation::new(&resource, 300, 8).unwrap();
        assert_eq!(pool.block_count(), 3);
        pool.check_integrity().unwrap();

        drop(b);
        assert_eq!(pool.block_count(), 2);
        assert_eq!(pool.free_range_count(), 2);

        drop(a);
        drop(c);
        assert_eq!(pool.block_count(), 0);
        assert_eq!(pool.free_range_count(), 1);
        assert_eq!(pool.largest_free_range(), 4096 - POOL_HEADER_SIZE);
        assert_eq!(pool.allocated_bytes(), 0);
    }

    #[test]
    fn test_freed_space_is_reused() {
        let (_dir, pool) = pool(1024);
        let resource: Arc<dyn MemoryResource> = pool.clone();

        for _ in 0..50 {
            let allocation = Allocation::new(&resource, 800, 8).unwrap();
            assert_eq!(allocation.len(), 800);
        }
        assert_eq!(pool.allocated_bytes(), 0);
    }

    #[test]
    fn test_out_of_space() {
        let (_dir, pool) = pool(1024);
        let err = pool.allocate(2048, 8).unwrap_err();
        assert!(matches!(err, Error::OutOfSpace { .. }));
    }

    #[test]
    fn test_alignment() {
        let (_dir, pool) = pool(8192);
        let ptr = pool.allocate(10, 256).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 256, 0);
        pool.check_integrity().unwrap();
    }

    #[test]
    fn test_detects_corrupted_block_header() {
        let (_dir, pool) = pool(4096);
        let ptr = pool.allocate(64, 8).unwrap();

        unsafe { *ptr.as_ptr().sub(BLOCK_HEADER_SIZE - 9) ^= 0xFF };
        assert!(matches!(pool.check_integrity(), Err(Error::CorruptedPool(_))));
    }
}
