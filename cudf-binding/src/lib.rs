//! Host runtime bindings for the columnar engine.
//!
//! A host loads the module through [`init`], which wires a [`HostEngine`] to a
//! slab-pooled memory resource and hands back a [`Module`]. Columns created
//! through the module own their native buffers and free them on
//! [`Column::release`] or drop. Every engine failure reaching the host is a
//! [`BindingError`].

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use gpu_kernels::HostEngine;
use gpu_memory_manager::{MemoryStats, SlabAllocator};

pub mod args;
pub mod column;
pub mod context;
pub mod error;
pub mod table;
pub mod text;

pub use args::{CallArgs, FromCallArgs, HostValue};
pub use column::{Column, HostReturn};
pub use context::EngineContext;
pub use error::{BindingError, Result};
pub use gpu_column::LogicalType;
pub use table::Table;

/// Module configuration, supplied by the host as a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleConfig {
    /// Upper bound on live device memory (bytes)
    pub max_device_memory: usize,
    /// Pooled slab size classes (bytes)
    pub slab_sizes: Vec<usize>,
    /// Free slabs kept per size class
    pub max_slabs_per_class: usize,
    /// Bytes pulled from a file source per read
    pub read_chunk_size: usize,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            max_device_memory: 1024 * 1024 * 1024, // 1GB
            slab_sizes: vec![256, 4 * 1024, 64 * 1024, 1024 * 1024],
            max_slabs_per_class: 64,
            read_chunk_size: 64 * 1024,
        }
    }
}

impl ModuleConfig {
    pub fn from_json(options: &serde_json::Value) -> Result<Self> {
        Self::deserialize(options)
            .map_err(|e| BindingError::InvalidArgument(format!("invalid module options: {}", e)))
    }
}

/// Initialise the module. `options` is an optional JSON configuration object.
pub fn init(options: Option<&serde_json::Value>) -> Result<Module> {
    let config = match options {
        Some(value) if !value.is_null() => ModuleConfig::from_json(value)?,
        _ => ModuleConfig::default(),
    };
    Module::new(config)
}

/// The loaded module and its export table.
#[derive(Clone)]
pub struct Module {
    ctx: Arc<EngineContext>,
    config: ModuleConfig,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Module {
    /// Names registered on the host module object.
    pub const EXPORTS: [&'static str; 2] = ["init", "Column"];

    pub fn new(config: ModuleConfig) -> Result<Self> {
        let memory = SlabAllocator::new(
            &config.slab_sizes,
            config.max_slabs_per_class,
            config.max_device_memory,
        )
        .map_err(|e| BindingError::InvalidArgument(format!("{:#}", e)))?;
        let engine = HostEngine::new(config.read_chunk_size);
        info!(
            "module initialised: {} byte budget, {} slab classes, {} byte reads",
            config.max_device_memory,
            config.slab_sizes.len(),
            config.read_chunk_size
        );
        Ok(Self {
            ctx: Arc::new(EngineContext::new(Box::new(engine), memory)),
            config,
        })
    }

    pub fn exports(&self) -> &'static [&'static str] {
        &Self::EXPORTS
    }

    /// The exported `init` entry. Loading already happened, so this only
    /// hands the module back.
    pub fn init(&self) -> &Self {
        self
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.ctx.memory_stats()
    }

    /// `new Column(typeName, _unused, data)`.
    pub fn column(&self, args: &CallArgs) -> Result<Column> {
        Column::new(&self.ctx, args)
    }

    pub fn column_from_bytes(&self, type_name: &str, data: &[u8]) -> Result<Column> {
        Column::from_bytes(&self.ctx, type_name, data)
    }

    /// `splitOnDelimiter(column, delimiter)` with host arguments.
    pub fn split_on_delimiter(&self, column: &Column, args: &CallArgs) -> Result<Column> {
        let parsed = args::SplitArgs::from_call_args(args)?;
        column.split(&parsed.delimiter)
    }

    /// `readTextFile(path, delimiter)` with host arguments.
    pub fn read_text_file(&self, args: &CallArgs) -> Result<Column> {
        let parsed = args::ReadTextArgs::from_call_args(args)?;
        self.read_text(&parsed.path, &parsed.delimiter)
    }

    pub fn read_text(&self, path: impl AsRef<Path>, delimiter: &str) -> Result<Column> {
        text::read_text(&self.ctx, path.as_ref(), delimiter)
    }

    pub fn table(&self, columns: Vec<Column>) -> Result<Table> {
        Table::new(columns)
    }
}
