//! The shared engine context behind every binding call.

use gpu_kernels::Engine;
use gpu_memory_manager::{MemoryStats, SlabAllocator};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

use crate::error::{BindingError, Result};

/// Owns the engine and its memory pool.
///
/// The engine is not reentrant, so every call goes through one lock.
pub struct EngineContext {
    engine: Mutex<Box<dyn Engine>>,
    memory: SlabAllocator,
}

impl EngineContext {
    pub fn new(engine: Box<dyn Engine>, memory: SlabAllocator) -> Self {
        Self {
            engine: Mutex::new(engine),
            memory,
        }
    }

    pub fn memory(&self) -> &SlabAllocator {
        &self.memory
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.memory.stats()
    }

    /// Run one engine operation.
    ///
    /// Engine errors and panics are translated into [`BindingError`]s here
    /// and never reach the caller in their native form.
    pub fn call<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Engine, &SlabAllocator) -> anyhow::Result<T>,
    {
        let engine = self.engine.lock();
        debug!("engine call: {}", op);
        match panic::catch_unwind(AssertUnwindSafe(|| f(engine.as_ref(), &self.memory))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                debug!("engine call {} failed: {:#}", op, err);
                Err(BindingError::from_engine(err))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("engine call {} panicked: {}", op, message);
                Err(BindingError::Engine(format!("{}: {}", op, message)))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "engine panicked".to_string()
    }
}
