//! The call contract between bindings and the columnar engine.

use anyhow::Result;
use gpu_column::ColumnBuffer;
use gpu_memory_manager::SlabAllocator;
use std::path::Path;
use tracing::debug;

use crate::data_chunk_source::{self, DataChunkSource, DeviceSpanSource};
use crate::{multibyte_split, stream_compaction};

/// Operations the binding layer may invoke on the engine.
///
/// Implementations are not required to be reentrant; callers serialize access.
pub trait Engine: Send {
    /// Split the bytes of `source` on `delimiter` into a strings column.
    fn multibyte_split(
        &self,
        source: &mut dyn DataChunkSource,
        delimiter: &str,
        mr: &SlabAllocator,
    ) -> Result<ColumnBuffer>;

    /// Open a file-backed source for [`Engine::multibyte_split`].
    fn make_source_from_file(&self, path: &Path) -> Result<Box<dyn DataChunkSource>>;

    /// Keep the rows of `columns` where `boolean_mask` is true.
    fn apply_boolean_mask(
        &self,
        columns: &[&ColumnBuffer],
        boolean_mask: &ColumnBuffer,
        mr: &SlabAllocator,
    ) -> Result<Vec<ColumnBuffer>>;

    /// Rows of `column` at `indices`, in that order.
    fn gather(&self, column: &ColumnBuffer, indices: &[usize], mr: &SlabAllocator) -> Result<ColumnBuffer>;

    /// Split the character data of a string column.
    fn split_column(
        &self,
        column: &ColumnBuffer,
        delimiter: &str,
        mr: &SlabAllocator,
    ) -> Result<ColumnBuffer> {
        let mut source = DeviceSpanSource::new(column.chars()?);
        self.multibyte_split(&mut source, delimiter, mr)
    }

    /// Read and split a delimiter-separated text file.
    fn read_text(&self, path: &Path, delimiter: &str, mr: &SlabAllocator) -> Result<ColumnBuffer> {
        let mut source = self.make_source_from_file(path)?;
        self.multibyte_split(source.as_mut(), delimiter, mr)
    }
}

/// Host implementation of the engine kernels.
#[derive(Debug, Clone)]
pub struct HostEngine {
    read_chunk_size: usize,
}

impl HostEngine {
    pub fn new(read_chunk_size: usize) -> Self {
        Self {
            read_chunk_size: read_chunk_size.max(1),
        }
    }
}

impl Default for HostEngine {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

impl Engine for HostEngine {
    fn multibyte_split(
        &self,
        source: &mut dyn DataChunkSource,
        delimiter: &str,
        mr: &SlabAllocator,
    ) -> Result<ColumnBuffer> {
        debug!("HostEngine::multibyte_split (chunk size {})", self.read_chunk_size);
        multibyte_split::multibyte_split(source, delimiter, self.read_chunk_size, mr)
    }

    fn make_source_from_file(&self, path: &Path) -> Result<Box<dyn DataChunkSource>> {
        Ok(Box::new(data_chunk_source::make_source_from_file(path)?))
    }

    fn apply_boolean_mask(
        &self,
        columns: &[&ColumnBuffer],
        boolean_mask: &ColumnBuffer,
        mr: &SlabAllocator,
    ) -> Result<Vec<ColumnBuffer>> {
        stream_compaction::apply_boolean_mask(columns, boolean_mask, mr)
    }

    fn gather(&self, column: &ColumnBuffer, indices: &[usize], mr: &SlabAllocator) -> Result<ColumnBuffer> {
        stream_compaction::gather(column, indices, mr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn mr() -> SlabAllocator {
        SlabAllocator::new(&[256, 4096], 16, 1 << 20).unwrap()
    }

    #[test]
    fn split_column_uses_chars_child() {
        let mr = mr();
        let engine = HostEngine::default();
        let col = ColumnBuffer::from_strings(&mr, [Some("a,b"), Some(",c")]).unwrap();
        let out = engine.split_column(&col, ",", &mr).unwrap();
        let rows: Vec<_> = (0..out.size()).map(|i| out.string_at(i).unwrap().unwrap()).collect();
        assert_eq!(rows, vec!["a", "b", "", "c"]);
    }

    #[test]
    fn read_text_matches_in_memory_split() {
        let mr = mr();
        let engine = HostEngine::new(3);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"alpha||beta||||gamma").unwrap();

        let from_file = engine.read_text(file.path(), "||", &mr).unwrap();
        let in_memory = ColumnBuffer::from_host_bytes(
            &mr,
            gpu_column::LogicalType::String,
            b"alpha||beta||||gamma",
        )
        .unwrap();
        let from_memory = engine.split_column(&in_memory, "||", &mr).unwrap();

        assert_eq!(from_file.size(), 4);
        assert_eq!(from_file.chars().unwrap(), from_memory.chars().unwrap());
        for i in 0..=from_file.size() {
            assert_eq!(from_file.offset_at(i).unwrap(), from_memory.offset_at(i).unwrap());
        }
    }

    #[test]
    fn gather_reorders_rows() {
        let mr = mr();
        let engine = HostEngine::default();
        let col = ColumnBuffer::from_strings(&mr, [Some("a"), None, Some("c")]).unwrap();
        let out = engine.gather(&col, &[2, 1, 2], &mr).unwrap();
        assert_eq!(out.string_at(0).unwrap(), Some("c"));
        assert_eq!(out.string_at(1).unwrap(), None);
        assert_eq!(out.null_count(), 1);
        assert!(engine.gather(&col, &[3], &mr).is_err());
    }

    #[test]
    fn split_non_string_column_fails() {
        let mr = mr();
        let engine = HostEngine::default();
        let col = ColumnBuffer::from_host_bytes(&mr, gpu_column::LogicalType::Int8, &[1, 2]).unwrap();
        assert!(engine.split_column(&col, ",", &mr).is_err());
    }
}
