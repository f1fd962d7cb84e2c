//! Owned registry of memory resources.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::common::{Error, Result};
use crate::memory::{HeapResource, MemoryResource, MmapResource, MonotonicResource, PoolResource};

/// Handle to a resource owned by a [`MemoryResourceRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(pub usize);

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource({})", self.0)
    }
}

/// Creates and owns the memory resources of one manager instance.
///
/// Handles are indices in creation order and double as the suffix of the
/// backing file names (`mmap_pool{handle}`, `pmem_pool{handle}`).
pub struct MemoryResourceRegistry {
    directory: PathBuf,
    resources: Mutex<Vec<Arc<dyn MemoryResource>>>,
}

impl MemoryResourceRegistry {
    /// Create an empty registry placing backing files in `directory`.
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            resources: Mutex::new(Vec::new()),
        }
    }

    /// Directory holding the backing files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.resources.lock().len()
    }

    /// Whether no resource has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.resources.lock().is_empty()
    }

    /// Register an existing resource.
    pub fn register(&self, resource: Arc<dyn MemoryResource>) -> ResourceHandle {
        let mut resources = self.resources.lock();
        resources.push(resource);
        ResourceHandle(resources.len() - 1)
    }

    /// Register a non-primary heap resource named `name`.
    pub fn create_heap(&self, name: &str) -> ResourceHandle {
        self.register(Arc::new(HeapResource::new(name)))
    }

    /// Register a bump arena over the resource behind `upstream`.
    pub fn create_monotonic(&self, upstream: ResourceHandle) -> Result<ResourceHandle> {
        let upstream = self.get(upstream)?;
        let name = format!("monotonic({})", upstream.name());
        Ok(self.register(Arc::new(MonotonicResource::new(name, upstream))))
    }

    /// Create a memory-mapped file of `file_size` bytes and register it.
    ///
    /// Returns the concrete resource as well, for callers that need the
    /// file-level operations.
    pub fn create_mmap(&self, file_size: usize) -> Result<(ResourceHandle, Arc<MmapResource>)> {
        let mut resources = self.resources.lock();
        let handle = ResourceHandle(resources.len());
        let path = self.directory.join(format!("mmap_pool{}", handle.0));

        let mmap = Arc::new(MmapResource::create(&path, file_size)?);
        resources.push(mmap.clone());

        info!(%handle, path = %path.display(), file_size, "created mmap resource");
        Ok((handle, mmap))
    }

    /// Create a persistent pool of `pool_size` bytes and register it.
    pub fn create_pool(&self, pool_size: usize) -> Result<(ResourceHandle, Arc<PoolResource>)> {
        let mut resources = self.resources.lock();
        let handle = ResourceHandle(resources.len());
        let path = self.directory.join(format!("pmem_pool{}", handle.0));

        let pool = Arc::new(PoolResource::create(&path, pool_size)?);
        resources.push(pool.clone());

        info!(%handle, path = %path.display(), pool_size, "created persistent pool");
        Ok((handle, pool))
    }

    /// Look up a resource.
    ///
    /// # Errors
    /// `Error::UnknownResource` if the handle was not issued by this registry.
    pub fn get(&self, handle: ResourceHandle) -> Result<Arc<dyn MemoryResource>> {
        self.resources
            .lock()
            .get(handle.0)
            .cloned()
            .ok_or(Error::UnknownResource(handle.0))
    }
}

impl fmt::Debug for MemoryResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .resources
            .lock()
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        f.debug_struct("MemoryResourceRegistry")
            .field("directory", &self.directory)
            .field("resources", &names)
            .finish()
    }
}
