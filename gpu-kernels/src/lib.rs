//! Columnar engine kernels.
//!
//! The binding layer only talks to the engine through [`Engine`]; the
//! functions in the submodules are the host implementations behind it.

pub mod data_chunk_source;
pub mod engine;
pub mod multibyte_split;
pub mod stream_compaction;

pub use data_chunk_source::{make_source_from_file, DataChunkSource, DeviceSpanSource, FileSource};
pub use engine::{Engine, HostEngine};
pub use multibyte_split::multibyte_split;
pub use stream_compaction::{apply_boolean_mask, gather};
