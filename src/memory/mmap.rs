//! Memory-mapped file resource.
//!
//! The [`MmapResource`] turns a fixed-size file into an append-only arena:
//! - Creating and sizing the backing file
//! - Handing out aligned ranges below a high-water mark
//! - Flushing and releasing written ranges

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use memmap2::{MmapMut, MmapOptions};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::common::{Error, Result};
use crate::memory::{align_up, MemoryResource};

/// A fixed-size memory-mapped file used as a bump arena.
///
/// # File Layout
/// Allocations are laid out back to back from offset 0:
/// ```text
/// ┌──────────┬─────┬──────────┬──────────┬─────────────────────┐
/// │ alloc 0  │ pad │ alloc 1  │ alloc 2  │      (unused)       │
/// └──────────┴─────┴──────────┴──────────┴─────────────────────┘
/// 0                                      ^ high-water mark     file_size
/// ```
///
/// Every allocation starts at the high-water mark rounded up to its
/// alignment. Deallocation is a no-op; space is reclaimed only when the
/// file is deleted.
///
/// # Thread Safety
/// The high-water mark is protected by a `Mutex`; the mapping itself is only
/// written through disjoint ranges handed out by `allocate`.
pub struct MmapResource {
    path: PathBuf,
    file_size: usize,
    map: MmapMut,
    base: NonNull<u8>,
    /// `None` once the file has been closed and deleted.
    file: Mutex<Option<File>>,
    high_water_mark: Mutex<usize>,
}

// SAFETY: `base` points into `map`, which lives as long as self. Concurrent
// writers only ever touch disjoint ranges handed out under the hwm lock.
unsafe impl Send for MmapResource {}
unsafe impl Sync for MmapResource {}

impl MmapResource {
    /// Create (or truncate) `path`, size it to `file_size` bytes and map it.
    ///
    /// # Errors
    /// - `Error::Allocation` if `file_size` is zero
    /// - `Error::Io` if the file cannot be created, sized or mapped
    pub fn create<P: AsRef<Path>>(path: P, file_size: usize) -> Result<Self> {
        if file_size == 0 {
            return Err(Error::Allocation("mmap file size must be > 0".into()));
        }

        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(file_size as u64)?;

        // SAFETY: the file was just created by us and is not resized while mapped.
        let mut map = unsafe { MmapOptions::new().len(file_size).map_mut(&file)? };
        let base = NonNull::new(map.as_mut_ptr())
            .ok_or_else(|| Error::Allocation("mmap returned a null mapping".into()))?;

        debug!(path = %path.display(), file_size, "created mmap resource");

        Ok(Self {
            path,
            file_size,
            map,
            base,
            file: Mutex::new(Some(file)),
            high_water_mark: Mutex::new(0),
        })
    }

    /// Path of the backing file.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capacity of the mapping in bytes.
    #[inline]
    pub fn file_size(&self) -> usize {
        self.file_size
    }

    /// First unused byte offset.
    pub fn high_water_mark(&self) -> usize {
        *self.high_water_mark.lock()
    }

    /// Move the high-water mark forward to `offset`.
    ///
    /// # Errors
    /// `Error::OutOfSpace` if `offset` lies beyond the end of the file.
    ///
    /// # Panics
    /// Panics if `offset` would move the mark backwards.
    pub fn advance_high_water_mark(&self, offset: usize) -> Result<()> {
        let mut hwm = self.high_water_mark.lock();
        assert!(
            offset >= *hwm,
            "high-water mark may only grow ({} -> {})",
            *hwm,
            offset
        );
        if offset > self.file_size {
            return Err(Error::OutOfSpace {
                resource: self.path.display().to_string(),
                requested: offset - *hwm,
                available: self.file_size - *hwm,
            });
        }
        *hwm = offset;
        Ok(())
    }

    /// Whether the backing file is still open.
    pub fn is_open(&self) -> bool {
        self.file.lock().is_some()
    }

    /// Offset of `ptr` within the mapping, if it points into it.
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        let base = self.base.as_ptr() as usize;
        let addr = ptr as usize;
        (addr >= base && addr < base + self.file_size).then(|| addr - base)
    }

    /// Flush the whole mapping to the file.
    pub fn sync(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }

    /// Flush `len` bytes starting at `offset` to the file.
    pub fn sync_range(&self, offset: usize, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        self.check_range(offset, len)?;
        self.map.flush_range(offset, len)?;
        Ok(())
    }

    /// Hand the physical pages of a flushed range back to the OS.
    ///
    /// The mapping is shared, so the next access faults the pages back in
    /// from the file. `offset` must be page aligned.
    pub fn release_range(&self, offset: usize, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        self.check_range(offset, len)?;

        #[cfg(unix)]
        {
            // SAFETY: the range lies inside our shared mapping and has been
            // flushed; MADV_DONTNEED only drops the resident copy.
            let rc = unsafe {
                libc::madvise(
                    self.base.as_ptr().add(offset) as *mut libc::c_void,
                    len,
                    libc::MADV_DONTNEED,
                )
            };
            if rc != 0 {
                return Err(std::io::Error::last_os_error().into());
            }
        }

        Ok(())
    }

    /// Flush, close and delete the backing file.
    ///
    /// The mapping stays valid until the resource is dropped, so copies that
    /// still point into it remain readable.
    pub fn close_and_delete(&self) -> Result<()> {
        let Some(file) = self.file.lock().take() else {
            return Ok(());
        };
        self.map.flush()?;
        drop(file);

        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        debug!(path = %self.path.display(), "deleted mmap file");
        Ok(())
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.file_size => Ok(()),
            _ => Err(Error::OutOfSpace {
                resource: self.path.display().to_string(),
                requested: len,
                available: self.file_size.saturating_sub(offset),
            }),
        }
    }
}

impl MemoryResource for MmapResource {
    fn name(&self) -> &str {
        "mmap"
    }

    fn allocate(&self, bytes: usize, align: usize) -> Result<NonNull<u8>> {
        let mut hwm = self.high_water_mark.lock();

        let start = align_up(*hwm, align);
        let end = start.checked_add(bytes).filter(|&end| end <= self.file_size);
        let Some(end) = end else {
            return Err(Error::OutOfSpace {
                resource: self.path.display().to_string(),
                requested: bytes,
                available: self.file_size.saturating_sub(*hwm),
            });
        };

        *hwm = end;
        // SAFETY: start < end <= file_size, inside the mapping.
        let ptr = unsafe { self.base.as_ptr().add(start) };
        NonNull::new(ptr).ok_or_else(|| Error::Allocation("null mapping pointer".into()))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _bytes: usize, _align: usize) {
        // Append-only: space comes back when the file is deleted.
    }

    fn allocated_bytes(&self) -> usize {
        self.high_water_mark()
    }

    fn persist(&self) -> Result<()> {
        self.sync()
    }
}

impl Drop for MmapResource {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.map.flush() {
                warn!(path = %self.path.display(), error = %e, "failed to flush mmap on drop");
            }
        }
    }
}

impl std::fmt::Debug for MmapResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapResource")
            .field("path", &self.path)
            .field("file_size", &self.file_size)
            .field("high_water_mark", &self.high_water_mark())
            .finish()
    }
}
