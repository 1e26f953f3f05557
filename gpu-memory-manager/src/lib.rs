//! Device memory for the columnar engine.
//!
//! Every column buffer handed out by the engine is a [`DeviceBuffer`]: an
//! exclusively owned allocation that goes back to its [`SlabAllocator`]
//! exactly once, when the handle is dropped.

pub mod device_buffer;
pub mod slab_allocator;

pub use device_buffer::DeviceBuffer;
pub use slab_allocator::{MemoryStats, SlabAllocator};
