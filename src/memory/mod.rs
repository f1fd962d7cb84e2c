//! Memory resources - where segment bytes live.
//!
//! A [`MemoryResource`] hands out raw byte ranges. Segments never talk to a
//! resource directly; they own [`TypedBuffer`]s, which own an [`Allocation`],
//! which keeps its resource alive and returns the range on drop.
//!
//! # Resources
//! - [`HeapResource`] - the process heap (primary memory)
//! - [`MonotonicResource`] - bump arena layered over any upstream resource
//! - [`MmapResource`] - append-only arena inside a memory-mapped file
//! - [`PoolResource`] - checksummed object pool inside a mapped file
//! - [`MemoryResourceRegistry`] - owns resources and hands out handles

mod heap;
mod mmap;
mod monotonic;
mod pool;
mod registry;

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, Result};

pub use heap::HeapResource;
pub use mmap::MmapResource;
pub use monotonic::MonotonicResource;
pub use pool::PoolResource;
pub use registry::{MemoryResourceRegistry, ResourceHandle};

/// A source of raw memory.
///
/// Implementations must be internally synchronized: `allocate` and
/// `deallocate` are called through shared references from several threads.
pub trait MemoryResource: Send + Sync + fmt::Debug {
    /// Human readable name used in log lines and errors.
    fn name(&self) -> &str;

    /// Allocate `bytes` bytes (`bytes > 0`) aligned to `align` (a power of two).
    ///
    /// The returned memory is initialized (zeroed or previously written bytes).
    ///
    /// # Errors
    /// `Error::OutOfSpace` when the resource cannot satisfy the request.
    fn allocate(&self, bytes: usize, align: usize) -> Result<NonNull<u8>>;

    /// Return a range obtained from `allocate`.
    ///
    /// # Safety
    /// `ptr`, `bytes` and `align` must match a previous `allocate` call on
    /// this resource, and the range must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, align: usize);

    /// Bytes currently handed out (or consumed, for append-only resources).
    fn allocated_bytes(&self) -> usize;

    /// Whether memory from this resource counts as primary (resident) memory.
    fn is_primary(&self) -> bool {
        false
    }

    /// Make everything written so far durable. No-op for volatile resources.
    fn persist(&self) -> Result<()> {
        Ok(())
    }
}

/// Round `value` up to the next multiple of `align` (a power of two).
#[inline]
pub fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Page size of the operating system, falling back to [`PAGE_SIZE`].
pub fn os_page_size() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 && (size as usize).is_power_of_two() {
            return size as usize;
        }
    }
    PAGE_SIZE
}

// ============================================================================
// Allocation
// ============================================================================

/// An owned byte range from a [`MemoryResource`].
///
/// Holds an `Arc` to its resource, so a file mapping stays valid for as long
/// as any segment copy still points into it. Zero-length allocations never
/// touch the resource.
pub struct Allocation {
    ptr: NonNull<u8>,
    len: usize,
    align: usize,
    resource: Arc<dyn MemoryResource>,
}

// SAFETY: an Allocation is the unique owner of its range; the resource is
// Send + Sync and only used for deallocation.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

impl Allocation {
    /// Allocate `len` bytes aligned to `align` from `resource`.
    ///
    /// # Errors
    /// - `Error::Allocation` if `align` is not a power of two
    /// - whatever the resource reports (typically `Error::OutOfSpace`)
    pub fn new(resource: &Arc<dyn MemoryResource>, len: usize, align: usize) -> Result<Self> {
        if !align.is_power_of_two() {
            return Err(Error::Allocation(format!(
                "alignment {} is not a power of two",
                align
            )));
        }

        let ptr = if len == 0 {
            // A well-aligned dangling pointer; never dereferenced for len > 0.
            NonNull::new(align as *mut u8)
                .ok_or_else(|| Error::Allocation("zero alignment".into()))?
        } else {
            resource.allocate(len, align)?
        };

        Ok(Self {
            ptr,
            len,
            align,
            resource: Arc::clone(resource),
        })
    }

    /// Number of bytes in this allocation.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this allocation is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The resource this range belongs to.
    #[inline]
    pub fn resource(&self) -> &Arc<dyn MemoryResource> {
        &self.resource
    }

    /// Raw pointer to the first byte.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Get immutable slice of the allocated bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the range is owned by self, initialized, and valid for len.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Get mutable slice of the allocated bytes.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if self.len > 0 {
            // SAFETY: ptr/len/align come from allocate on this resource.
            unsafe { self.resource.deallocate(self.ptr, self.len, self.align) };
        }
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("len", &self.len)
            .field("align", &self.align)
            .field("resource", &self.resource.name())
            .finish()
    }
}

// ============================================================================
// TypedBuffer
// ============================================================================

/// Plain-old-data element types that may live in a [`TypedBuffer`].
///
/// # Safety
/// Implementors must be valid for every bit pattern and contain no pointers.
pub unsafe trait Pod: Copy + Send + Sync + 'static {}

unsafe impl Pod for u8 {}
unsafe impl Pod for u16 {}
unsafe impl Pod for u32 {}
unsafe impl Pod for u64 {}
unsafe impl Pod for i32 {}
unsafe impl Pod for i64 {}

/// A fixed-length array of `T` stored in a memory resource.
///
/// This is what "copy using allocator" means for a segment: every buffer of
/// the segment is re-created with [`TypedBuffer::from_slice`] on the target
/// resource.
pub struct TypedBuffer<T: Pod> {
    allocation: Allocation,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> TypedBuffer<T> {
    /// Copy `data` into a new buffer allocated from `resource`.
    pub fn from_slice(resource: &Arc<dyn MemoryResource>, data: &[T]) -> Result<Self> {
        let bytes = std::mem::size_of_val(data);
        let mut allocation = Allocation::new(resource, bytes, std::mem::align_of::<T>())?;

        if bytes > 0 {
            // SAFETY: the allocation holds `bytes` bytes aligned for T and does
            // not overlap `data`.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    data.as_ptr() as *const u8,
                    allocation.as_mut_slice().as_mut_ptr(),
                    bytes,
                );
            }
        }

        Ok(Self {
            allocation,
            len: data.len(),
            _marker: PhantomData,
        })
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the element data in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.allocation.len()
    }

    /// The resource holding the elements.
    #[inline]
    pub fn resource(&self) -> &Arc<dyn MemoryResource> {
        self.allocation.resource()
    }

    /// View the elements.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the allocation is aligned for T, holds len initialized
        // elements, and T is valid for any bit pattern.
        unsafe { std::slice::from_raw_parts(self.allocation.as_ptr() as *const T, self.len) }
    }

    /// Mutably view the elements.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as above, with exclusive access through &mut self.
        unsafe { std::slice::from_raw_parts_mut(self.allocation.as_ptr() as *mut T, self.len) }
    }
}

impl<T: Pod + fmt::Debug> fmt::Debug for TypedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedBuffer")
            .field("len", &self.len)
            .field("resource", &self.resource().name())
            .finish()
    }
}
