//! Chunked byte sources consumed by the text kernels.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::info;

/// A stream of input bytes delivered in bounded chunks.
pub trait DataChunkSource: Send {
    /// Replace `chunk` with up to `max_bytes` of the next input. An empty
    /// chunk means the input is exhausted.
    fn next_chunk(&mut self, chunk: &mut Vec<u8>, max_bytes: usize) -> Result<()>;
}

/// Source over bytes that are already resident in a column buffer.
pub struct DeviceSpanSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DeviceSpanSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl DataChunkSource for DeviceSpanSource<'_> {
    fn next_chunk(&mut self, chunk: &mut Vec<u8>, max_bytes: usize) -> Result<()> {
        let end = self.data.len().min(self.pos + max_bytes.max(1));
        chunk.clear();
        chunk.extend_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }
}

/// Source streaming a file from disk.
pub struct FileSource {
    path: PathBuf,
    reader: BufReader<File>,
}

impl DataChunkSource for FileSource {
    fn next_chunk(&mut self, chunk: &mut Vec<u8>, max_bytes: usize) -> Result<()> {
        chunk.clear();
        chunk.resize(max_bytes.max(1), 0);
        let mut filled = 0;
        // Keep reading until the chunk is full or the file ends.
        while filled < chunk.len() {
            let n = self
                .reader
                .read(&mut chunk[filled..])
                .with_context(|| format!("Failed to read {}", self.path.display()))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        chunk.truncate(filled);
        Ok(())
    }
}

/// Open `path` as a chunk source.
///
/// The `io::Error` stays in the error chain so callers can tell a missing
/// file apart from other failures.
pub fn make_source_from_file(path: impl AsRef<Path>) -> Result<FileSource> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    info!("Reading text from {}", path.display());
    Ok(FileSource {
        path: path.to_path_buf(),
        reader: BufReader::new(file),
    })
}
