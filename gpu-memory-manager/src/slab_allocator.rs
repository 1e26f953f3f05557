use anyhow::{bail, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::device_buffer::DeviceBuffer;

/// Slab allocator for device memory
///
/// Manages memory in fixed-size slabs to reduce fragmentation and make
/// repeated allocations of similar sizes cheap. Requests larger than the
/// biggest slab class are served directly and never pooled.
///
/// The allocator is a cheap handle; clones share the same pool.
#[derive(Clone)]
pub struct SlabAllocator {
    inner: Arc<AllocatorInner>,
}

pub(crate) struct AllocatorInner {
    slab_classes: Vec<SlabClass>,
    max_bytes: usize,
    /// Bytes backing live buffers plus bytes parked in the pools.
    bytes_reserved: AtomicUsize,
    /// Live buffer id -> requested length.
    live: DashMap<u64, usize>,
    next_id: AtomicU64,
}

struct SlabClass {
    size: usize,
    free_slabs: Mutex<Vec<Vec<u8>>>,
    max_slabs: usize,
}

/// Point-in-time view of the allocator's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub live_buffers: usize,
    pub bytes_in_use: usize,
    pub bytes_reserved: usize,
    pub pooled_slabs: usize,
}

impl SlabAllocator {
    pub fn new(slab_sizes: &[usize], max_slabs_per_class: usize, max_bytes: usize) -> Result<Self> {
        if slab_sizes.iter().any(|&size| size == 0) {
            bail!("Slab sizes must be non-zero: {:?}", slab_sizes);
        }

        let mut sizes = slab_sizes.to_vec();
        sizes.sort_unstable();
        sizes.dedup();

        info!("Initializing Slab Allocator");
        info!("  Slab sizes: {:?}", sizes);
        info!("  Max slabs per class: {}", max_slabs_per_class);
        info!("  Memory budget: {} bytes", max_bytes);

        let slab_classes = sizes
            .into_iter()
            .map(|size| SlabClass {
                size,
                free_slabs: Mutex::new(Vec::new()),
                max_slabs: max_slabs_per_class,
            })
            .collect();

        Ok(Self {
            inner: Arc::new(AllocatorInner {
                slab_classes,
                max_bytes,
                bytes_reserved: AtomicUsize::new(0),
                live: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    /// Allocate `len` zeroed bytes.
    pub fn allocate(&self, len: usize) -> Result<DeviceBuffer> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let (storage, class) = match self.find_slab_class(len) {
            Some(idx) => (self.take_slab(idx)?, Some(idx)),
            None => {
                self.reserve(len)?;
                debug!("Allocating {} bytes outside the slab classes", len);
                (vec![0u8; len], None)
            }
        };

        self.inner.live.insert(id, len);
        Ok(DeviceBuffer::new(id, len, storage, class, self.inner.clone()))
    }

    /// Allocate a buffer holding a copy of `src`.
    pub fn allocate_from_host(&self, src: &[u8]) -> Result<DeviceBuffer> {
        let mut buffer = self.allocate(src.len())?;
        buffer.copy_from_host(src)?;
        Ok(buffer)
    }

    /// Release every pooled slab back to the system. Returns the bytes freed.
    pub fn trim(&self) -> usize {
        let mut freed = 0;
        for slab_class in &self.inner.slab_classes {
            let mut free_slabs = slab_class.free_slabs.lock();
            freed += free_slabs.len() * slab_class.size;
            free_slabs.clear();
        }
        self.inner.bytes_reserved.fetch_sub(freed, Ordering::AcqRel);
        if freed > 0 {
            debug!("Trimmed {} pooled bytes", freed);
        }
        freed
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            live_buffers: self.inner.live.len(),
            bytes_in_use: self.inner.live.iter().map(|entry| *entry.value()).sum(),
            bytes_reserved: self.inner.bytes_reserved.load(Ordering::Acquire),
            pooled_slabs: self
                .inner
                .slab_classes
                .iter()
                .map(|c| c.free_slabs.lock().len())
                .sum(),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.inner.max_bytes
    }

    pub(crate) fn from_inner(inner: Arc<AllocatorInner>) -> Self {
        Self { inner }
    }

    // Zero-length requests never touch a slab.
    fn find_slab_class(&self, size: usize) -> Option<usize> {
        if size == 0 {
            return None;
        }
        self.inner
            .slab_classes
            .iter()
            .position(|slab_class| slab_class.size >= size)
    }

    fn take_slab(&self, class_idx: usize) -> Result<Vec<u8>> {
        let slab_class = &self.inner.slab_classes[class_idx];

        if let Some(mut slab) = slab_class.free_slabs.lock().pop() {
            debug!("Reusing slab from class {} (size {})", class_idx, slab_class.size);
            slab.fill(0);
            return Ok(slab);
        }

        self.reserve(slab_class.size)?;
        debug!("Allocating new slab for class {} (size {})", class_idx, slab_class.size);
        Ok(vec![0u8; slab_class.size])
    }

    fn reserve(&self, bytes: usize) -> Result<()> {
        if self.try_reserve(bytes) {
            return Ok(());
        }
        // Pooled slabs are the only memory we can give back on our own.
        if self.trim() > 0 && self.try_reserve(bytes) {
            return Ok(());
        }
        bail!(
            "Out of device memory: requested {} bytes with {} of {} bytes reserved",
            bytes,
            self.inner.bytes_reserved.load(Ordering::Acquire),
            self.inner.max_bytes
        );
    }

    fn try_reserve(&self, bytes: usize) -> bool {
        let max = self.inner.max_bytes;
        self.inner
            .bytes_reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(bytes).filter(|&total| total <= max)
            })
            .is_ok()
    }
}

impl AllocatorInner {
    /// Take back the storage of a dropped buffer.
    pub(crate) fn reclaim(&self, id: u64, class: Option<usize>, storage: Vec<u8>) {
        if self.live.remove(&id).is_none() {
            warn!("Buffer {} returned to the allocator twice", id);
            return;
        }

        let backing = storage.len();
        match class {
            Some(idx) => {
                let slab_class = &self.slab_classes[idx];
                let mut free_slabs = slab_class.free_slabs.lock();
                if free_slabs.len() >= slab_class.max_slabs {
                    debug!("Freeing slab (not pooling) from class {}", idx);
                    self.bytes_reserved.fetch_sub(backing, Ordering::AcqRel);
                } else {
                    debug!("Returning slab to pool (class {})", idx);
                    free_slabs.push(storage);
                }
            }
            None => {
                self.bytes_reserved.fetch_sub(backing, Ordering::AcqRel);
            }
        }
    }
}

impl Drop for AllocatorInner {
    fn drop(&mut self) {
        info!("Shutting down Slab Allocator");
        for (idx, slab_class) in self.slab_classes.iter().enumerate() {
            info!("  Class {}: {} free slabs", idx, slab_class.free_slabs.lock().len());
        }
    }
}
