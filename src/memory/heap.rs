//! Heap-backed memory resource.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::common::{Error, Result};
use crate::memory::MemoryResource;

/// A memory resource over the global allocator.
///
/// There are two flavours:
/// - the *primary* heap ([`HeapResource::shared`]), which is where resident
///   segments live;
/// - named, non-primary heaps used by the address-space tier. These only
///   account for bytes; nothing is persisted.
#[derive(Debug)]
pub struct HeapResource {
    name: String,
    primary: bool,
    allocated: AtomicUsize,
}

impl HeapResource {
    /// Create a non-primary heap resource (an accounting wrapper).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary: false,
            allocated: AtomicUsize::new(0),
        }
    }

    /// The process-wide primary heap, the default resource for segment data.
    pub fn shared() -> Arc<dyn MemoryResource> {
        static PRIMARY: OnceLock<Arc<HeapResource>> = OnceLock::new();
        let heap = PRIMARY.get_or_init(|| {
            Arc::new(HeapResource {
                name: "primary".to_string(),
                primary: true,
                allocated: AtomicUsize::new(0),
            })
        });
        Arc::clone(heap) as Arc<dyn MemoryResource>
    }
}

impl MemoryResource for HeapResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&self, bytes: usize, align: usize) -> Result<NonNull<u8>> {
        let layout = Layout::from_size_align(bytes, align)
            .map_err(|e| Error::Allocation(e.to_string()))?;

        // SAFETY: callers never request zero bytes (Allocation handles that).
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| Error::OutOfSpace {
            resource: self.name.clone(),
            requested: bytes,
            available: 0,
        })?;

        self.allocated.fetch_add(bytes, Ordering::Relaxed);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, align: usize) {
        // SAFETY: the layout was valid when the range was allocated.
        let layout = Layout::from_size_align_unchecked(bytes, align);
        alloc::dealloc(ptr.as_ptr(), layout);
        self.allocated.fetch_sub(bytes, Ordering::Relaxed);
    }

    fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    fn is_primary(&self) -> bool {
        self.primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Allocation;

    #[test]
    fn test_shared_is_primary() {
        let heap = HeapResource::shared();
        assert!(heap.is_primary());
        assert_eq!(heap.name(), "primary");
        assert!(Arc::ptr_eq(&heap, &HeapResource::shared()));
    }

    #[test]
    fn test_named_heap_is_not_primary() {
        let heap = HeapResource::new("address_space");
        assert!(!heap.is_primary());
        assert_eq!(heap.name(), "address_space");
    }

    #[test]
    fn test_accounting() {
        let heap: Arc<dyn MemoryResource> = Arc::new(HeapResource::new("accounting"));
        let a = Allocation::new(&heap, 100, 8).unwrap();
        let b = Allocation::new(&heap, 28, 4).unwrap();
        assert_eq!(heap.allocated_bytes(), 128);
        assert!(a.as_slice().iter().all(|&byte| byte == 0));

        drop(a);
        assert_eq!(heap.allocated_bytes(), 28);
        drop(b);
        assert_eq!(heap.allocated_bytes(), 0);
    }
}
