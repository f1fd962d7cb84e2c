//! Monotonic (bump) arena over an upstream resource.

use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{Error, Result};
use crate::memory::{align_up, Allocation, MemoryResource};

/// Default size of the first chunk requested from upstream.
pub const DEFAULT_INITIAL_CHUNK: usize = 64 * 1024;

/// Growth factor applied to each subsequent chunk.
const GROWTH_FACTOR: usize = 2;

/// Hands out memory by bumping a cursor through chunks taken from upstream.
///
/// Individual deallocation is a no-op. Chunks are returned to upstream when
/// the arena itself is dropped, i.e. once no allocation refers to it anymore.
///
/// # Thread Safety
/// The cursor and chunk list sit behind a single `Mutex`.
#[derive(Debug)]
pub struct MonotonicResource {
    name: String,
    upstream: Arc<dyn MemoryResource>,
    state: Mutex<ArenaState>,
}

#[derive(Debug)]
struct ArenaState {
    /// Chunks obtained from upstream, newest last.
    chunks: Vec<Allocation>,
    /// Bytes used in the newest chunk.
    cursor: usize,
    /// Size of the next chunk to request.
    next_chunk: usize,
    /// Bytes handed out to callers (excluding padding).
    allocated: usize,
}

impl MonotonicResource {
    /// Create an arena with the default initial chunk size.
    pub fn new(name: impl Into<String>, upstream: Arc<dyn MemoryResource>) -> Self {
        Self::with_initial_chunk(name, upstream, DEFAULT_INITIAL_CHUNK)
    }

    /// Create an arena whose first upstream chunk has `initial_chunk` bytes.
    pub fn with_initial_chunk(
        name: impl Into<String>,
        upstream: Arc<dyn MemoryResource>,
        initial_chunk: usize,
    ) -> Self {
        Self {
            name: name.into(),
            upstream,
            state: Mutex::new(ArenaState {
                chunks: Vec::new(),
                cursor: 0,
                next_chunk: initial_chunk.max(1),
                allocated: 0,
            }),
        }
    }

    /// The resource chunks are taken from.
    pub fn upstream(&self) -> &Arc<dyn MemoryResource> {
        &self.upstream
    }

    /// Number of chunks taken from upstream so far.
    pub fn chunk_count(&self) -> usize {
        self.state.lock().chunks.len()
    }
}

impl MemoryResource for MonotonicResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&self, bytes: usize, align: usize) -> Result<NonNull<u8>> {
        let mut state = self.state.lock();

        // Try the current chunk first
        if let Some(chunk) = state.chunks.last() {
            let base = chunk.as_ptr() as usize;
            let start = align_up(base + state.cursor, align) - base;
            if let Some(end) = start.checked_add(bytes) {
                if end <= chunk.len() {
                    // SAFETY: start < chunk.len(), so the pointer stays in bounds.
                    let ptr = unsafe { chunk.as_ptr().add(start) };
                    state.cursor = end;
                    state.allocated += bytes;
                    return NonNull::new(ptr)
                        .ok_or_else(|| Error::Allocation("null chunk pointer".into()));
                }
            }
        }

        // Need a new chunk large enough for this request
        let chunk_size = state.next_chunk.max(bytes);
        let chunk = Allocation::new(&self.upstream, chunk_size, align.max(16))?;
        let ptr = chunk.as_ptr();

        state.next_chunk = chunk_size.saturating_mul(GROWTH_FACTOR);
        state.cursor = bytes;
        state.allocated += bytes;
        state.chunks.push(chunk);

        NonNull::new(ptr).ok_or_else(|| Error::Allocation("null chunk pointer".into()))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _bytes: usize, _align: usize) {
        // Monotonic: memory is released when the arena drops.
    }

    fn allocated_bytes(&self) -> usize {
        self.state.lock().allocated
    }

    fn is_primary(&self) -> bool {
        self.upstream.is_primary()
    }

    fn persist(&self) -> Result<()> {
        self.upstream.persist()
    }
}
