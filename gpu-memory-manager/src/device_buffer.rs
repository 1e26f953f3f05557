//! An exclusively owned allocation handed out by the [`SlabAllocator`].

use anyhow::{bail, Result};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::slab_allocator::{AllocatorInner, SlabAllocator};

/// A block of device memory with a single owner.
///
/// Not `Clone`: copying device memory is explicit via [`DeviceBuffer::try_clone`].
/// Dropping the handle returns the memory to the allocator that produced it.
pub struct DeviceBuffer {
    id: u64,
    len: usize,
    storage: Vec<u8>,
    class: Option<usize>,
    allocator: Arc<AllocatorInner>,
}

impl DeviceBuffer {
    pub(crate) fn new(
        id: u64,
        len: usize,
        storage: Vec<u8>,
        class: Option<usize>,
        allocator: Arc<AllocatorInner>,
    ) -> Self {
        debug_assert!(storage.len() >= len);
        Self {
            id,
            len,
            storage,
            class,
            allocator,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Size in bytes requested by the caller.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the backing slab.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[..self.len]
    }

    /// Host-to-device copy. `src` must cover the whole buffer.
    pub fn copy_from_host(&mut self, src: &[u8]) -> Result<()> {
        if src.len() != self.len {
            bail!(
                "HtoD transfer size mismatch: buffer holds {} bytes, source has {}",
                self.len,
                src.len()
            );
        }
        debug!("HtoD transfer: {} bytes into buffer {}", src.len(), self.id);
        self.as_mut_slice().copy_from_slice(src);
        Ok(())
    }

    /// Deep copy into a new allocation from the same allocator.
    pub fn try_clone(&self) -> Result<Self> {
        self.allocator().allocate_from_host(self.as_slice())
    }

    pub fn allocator(&self) -> SlabAllocator {
        SlabAllocator::from_inner(self.allocator.clone())
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("id", &self.id)
            .field("len", &self.len)
            .field("capacity", &self.storage.len())
            .finish()
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        let storage = std::mem::take(&mut self.storage);
        self.allocator.reclaim(self.id, self.class, storage);
    }
}
