//! Split a byte stream into a strings column on a multi-byte delimiter.

use anyhow::{bail, Result};
use gpu_column::ColumnBuffer;
use gpu_memory_manager::SlabAllocator;
use tracing::debug;

use crate::data_chunk_source::DataChunkSource;

/// Split everything `source` yields on `delimiter`.
///
/// Delimiters are dropped from the output and empty fields are kept, so
/// `"a,b,,c"` on `","` gives `["a", "b", "", "c"]` and a trailing delimiter
/// gives a trailing empty row. An empty delimiter yields the whole input as
/// one row. Delimiters may straddle chunk boundaries.
pub fn multibyte_split(
    source: &mut dyn DataChunkSource,
    delimiter: &str,
    chunk_size: usize,
    mr: &SlabAllocator,
) -> Result<ColumnBuffer> {
    let delim = delimiter.as_bytes();
    let mut out = SplitOutput::default();
    let mut chunk = Vec::with_capacity(chunk_size);

    // Bytes of the field currently being assembled.
    let mut field: Vec<u8> = Vec::new();
    // Positions of `field` before this cannot start a delimiter.
    let mut searched = 0;

    loop {
        source.next_chunk(&mut chunk, chunk_size)?;
        if chunk.is_empty() {
            break;
        }
        field.extend_from_slice(&chunk);
        if delim.is_empty() {
            continue;
        }

        let mut start = 0;
        let mut pos = searched;
        while let Some(hit) = find(&field[pos..], delim) {
            let at = pos + hit;
            out.push(&field[start..at])?;
            start = at + delim.len();
            pos = start;
        }
        field.drain(..start);
        searched = field.len().saturating_sub(delim.len() - 1);
    }
    out.push(&field)?;

    debug!(
        "multibyte_split produced {} rows ({} bytes) on delimiter {:?}",
        out.offsets.len() - 1,
        out.chars.len(),
        delimiter
    );
    ColumnBuffer::new_strings(mr, &out.offsets, &out.chars, None)
}

struct SplitOutput {
    offsets: Vec<i32>,
    chars: Vec<u8>,
}

impl Default for SplitOutput {
    fn default() -> Self {
        Self {
            offsets: vec![0],
            chars: Vec::new(),
        }
    }
}

impl SplitOutput {
    fn push(&mut self, field: &[u8]) -> Result<()> {
        if let Err(e) = std::str::from_utf8(field) {
            bail!(
                "multibyte_split: row {} is not valid UTF-8 ({})",
                self.offsets.len() - 1,
                e
            );
        }
        self.chars.extend_from_slice(field);
        let Ok(end) = i32::try_from(self.chars.len()) else {
            bail!("multibyte_split: output exceeds the 2 GiB string column limit");
        };
        self.offsets.push(end);
        Ok(())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_chunk_source::DeviceSpanSource;

    fn mr() -> SlabAllocator {
        SlabAllocator::new(&[256, 4096], 16, 1 << 20).unwrap()
    }

    fn split(input: &[u8], delimiter: &str, chunk_size: usize) -> Result<Vec<String>> {
        let mr = mr();
        let mut source = DeviceSpanSource::new(input);
        let col = multibyte_split(&mut source, delimiter, chunk_size, &mr)?;
        (0..col.size())
            .map(|i| Ok(col.string_at(i)?.unwrap_or_default().to_string()))
            .collect()
    }

    #[test]
    fn keeps_empty_fields() {
        assert_eq!(split(b"a,b,,c", ",", 64).unwrap(), vec!["a", "b", "", "c"]);
    }

    #[test]
    fn trailing_delimiter_gives_empty_row() {
        assert_eq!(split(b"a,b,", ",", 64).unwrap(), vec!["a", "b", ""]);
        assert_eq!(split(b"", ",", 64).unwrap(), vec![""]);
    }

    #[test]
    fn multi_byte_delimiter_across_chunks() {
        let input = b"one::two::::three";
        for chunk_size in 1..=input.len() {
            assert_eq!(
                split(input, "::", chunk_size).unwrap(),
                vec!["one", "two", "", "three"],
                "chunk size {}",
                chunk_size
            );
        }
    }

    #[test]
    fn overlapping_delimiter_prefix() {
        // "aab" must not hide the "ab" delimiter starting at index 1.
        assert_eq!(split(b"xaabyab", "ab", 2).unwrap(), vec!["xa", "y", ""]);
    }

    #[test]
    fn empty_delimiter_is_one_row() {
        assert_eq!(split(b"a,b", "", 1).unwrap(), vec!["a,b"]);
    }

    #[test]
    fn invalid_utf8_fails() {
        let err = split(&[b'a', b',', 0xff, 0xfe], ",", 64).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn unicode_delimiter() {
        assert_eq!(split("α→β→γ".as_bytes(), "→", 3).unwrap(), vec!["α", "β", "γ"]);
    }
}
